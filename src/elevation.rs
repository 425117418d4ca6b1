//! Privilege elevation for nft invocations
//!
//! nftassist itself runs unprivileged; only the `nft` process is elevated.
//!
//! # Elevation Strategy
//!
//! 1. Already root: run `nft` directly
//! 2. `NFTASSIST_ELEVATION_METHOD` set: use exactly that method
//! 3. `run0` available (systemd v256+, no SUID)
//! 4. Interactive terminal: `sudo`
//! 5. Otherwise: `pkexec`
//!
//! # Environment Variables
//!
//! - `NFTASSIST_ELEVATION_METHOD`: Force `sudo`, `run0`, or `pkexec`.
//!   Example: `NFTASSIST_ELEVATION_METHOD=sudo nftassist list`
//! - `NFTASSIST_NFT_COMMAND`: Path of the nft binary to run. When set no
//!   elevation is applied; tests point this at `tests/mock_nft.sh`.
//! - `NFTASSIST_TEST_NO_ELEVATION`: Bypass elevation entirely.
//!
//! Arguments are passed as an argv vector, never through a shell.
//!
//! # Example
//!
//! ```no_run
//! use nftassist::elevation::create_elevated_nft_command;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cmd = create_elevated_nft_command(&["-j", "-a", "list", "ruleset"])?;
//! let output = cmd.output().await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use tokio::process::Command;

pub const ELEVATION_METHOD_VAR: &str = "NFTASSIST_ELEVATION_METHOD";
pub const NFT_COMMAND_VAR: &str = "NFTASSIST_NFT_COMMAND";
pub const NO_ELEVATION_VAR: &str = "NFTASSIST_TEST_NO_ELEVATION";

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - run as root or install sudo/PolicyKit")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    #[error("Invalid NFTASSIST_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                full_path.is_file().then_some(full_path)
            })
        })
        .is_some()
}

fn wrapped(elevator: &str, program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(elevator);
    cmd.arg(program).args(args);
    cmd
}

fn direct(program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

fn build_elevated_command(program: &str, args: &[&str]) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    if std::env::var_os(NO_ELEVATION_VAR).is_some() {
        return Ok(direct(program, args));
    }

    if nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    if let Ok(method) = std::env::var(ELEVATION_METHOD_VAR) {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" | "pkexec" => {
                    if binary_exists(&method) {
                        Ok(wrapped(&method, program, args))
                    } else {
                        Err(ElevationError::MethodNotAvailable(method))
                    }
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    if binary_exists("run0") {
        return Ok(wrapped("run0", program, args));
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);
    if is_atty {
        Ok(wrapped("sudo", program, args))
    } else if binary_exists("pkexec") {
        Ok(wrapped("pkexec", program, args))
    } else {
        Err(ElevationError::PkexecNotFound)
    }
}

/// Creates an `nft` command with the specified arguments, elevated if needed
///
/// # Errors
///
/// Returns `Err(ElevationError)` if the forced method is unknown or missing,
/// or no elevation helper can be found.
pub fn create_elevated_nft_command(args: &[&str]) -> Result<Command, ElevationError> {
    if let Some(program) = std::env::var_os(NFT_COMMAND_VAR).filter(|p| !p.is_empty()) {
        let mut cmd = Command::new(program);
        cmd.args(args);
        return Ok(cmd);
    }
    build_elevated_command("nft", args)
}
