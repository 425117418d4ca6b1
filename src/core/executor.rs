//! nft execution
//!
//! Everything that touches the live ruleset goes through an [`NftRunner`].
//! [`SystemNft`] spawns the (possibly elevated) `nft` binary; tests swap in
//! a recording runner.
//!
//! Batches are not transactional: commands run one by one, in order, and a
//! failure is recorded without stopping the rest. [`BatchReport`] says
//! which commands took effect.

use crate::core::error::{Error, NftablesErrorPattern, Result};
use crate::core::firewall::{ChainRef, NftCommand};
use std::fmt::Write as _;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Arguments for a handle-annotated JSON listing
pub const LIST_ARGS: [&str; 4] = ["-j", "-a", "list", "ruleset"];

/// Captured result of one nft process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NftOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl NftOutput {
    /// Diagnostic nft printed, falling back to stdout when stderr is empty
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs nft with an argument vector
#[allow(async_fn_in_trait)]
pub trait NftRunner {
    /// Spawns nft with `args`. `Err` only when the process could not run.
    async fn run(&self, args: &[String]) -> Result<NftOutput>;

    /// Spawns nft with `args` and writes `script` to its stdin
    async fn run_script(&self, args: &[String], script: &str) -> Result<NftOutput>;
}

/// The real `nft` binary, elevated via [`crate::elevation`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNft;

impl SystemNft {
    fn command(args: &[String]) -> Result<tokio::process::Command> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut cmd = crate::elevation::create_elevated_nft_command(&args)?;
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        Ok(cmd)
    }
}

fn spawn_error(args: &[String], e: &std::io::Error) -> Error {
    error!("Failed to spawn nft: {e}");
    Error::CommandExecutionFailed {
        command: format!("nft {}", args.join(" ")),
        message: format!("failed to spawn nft: {e}"),
        exit_code: None,
    }
}

impl NftRunner for SystemNft {
    async fn run(&self, args: &[String]) -> Result<NftOutput> {
        let output = Self::command(args)?
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(args, &e))?;

        Ok(NftOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }

    async fn run_script(&self, args: &[String], script: &str) -> Result<NftOutput> {
        let mut child = Self::command(args)?
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(args, &e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        Ok(NftOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

fn to_args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn failure(command: String, output: &NftOutput) -> Error {
    Error::CommandExecutionFailed {
        command,
        message: output.diagnostic().to_string(),
        exit_code: output.code,
    }
}

/// Runs one command, mapping a non-zero exit to [`Error::CommandExecutionFailed`].
///
/// # Errors
///
/// Fails if nft could not be spawned or exited non-zero.
pub async fn run_command(runner: &impl NftRunner, command: &NftCommand) -> Result<NftOutput> {
    debug!("Executing: {command}");
    let output = runner.run(&command.args()).await?;
    if output.success {
        Ok(output)
    } else {
        Err(failure(command.to_string(), &output))
    }
}

/// Fetches the handle-annotated JSON listing of the full ruleset.
///
/// # Errors
///
/// Fails if nft could not be spawned or exited non-zero.
pub async fn list_ruleset(runner: &impl NftRunner) -> Result<String> {
    let args = to_args(&LIST_ARGS);
    let output = runner.run(&args).await?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(failure(format!("nft {}", args.join(" ")), &output))
    }
}

/// nft script declaring the base table with input, output and forward
/// hooks at priority 0 and policy accept. Declaring an existing table
/// merges, so applying it twice is harmless.
pub fn base_table_script(chain: &ChainRef) -> String {
    const HOOKS: [&str; 3] = ["input", "output", "forward"];

    let mut script = String::new();
    let _ = writeln!(script, "table {} {} {{", chain.family, chain.table);
    for hook in HOOKS {
        let _ = writeln!(script, "    chain {hook} {{");
        let _ = writeln!(
            script,
            "        type filter hook {hook} priority 0; policy accept;"
        );
        let _ = writeln!(script, "    }}");
    }
    if !HOOKS.contains(&chain.chain.as_str()) {
        let _ = writeln!(script, "    chain {} {{", chain.chain);
        let _ = writeln!(script, "    }}");
    }
    script.push_str("}\n");
    script
}

/// Creates the base table and chains for `chain` via `nft -f -`.
///
/// # Errors
///
/// Fails if nft could not be spawned or rejected the script.
pub async fn init_table(runner: &impl NftRunner, chain: &ChainRef) -> Result<()> {
    let script = base_table_script(chain);
    let args = to_args(&["-f", "-"]);
    info!("Initializing table {} {}", chain.family, chain.table);
    let output = runner.run_script(&args, &script).await?;
    if output.success {
        info!("Table {} {} ready", chain.family, chain.table);
        Ok(())
    } else {
        error!("Table initialization failed: {}", output.diagnostic());
        Err(failure("nft -f -".to_string(), &output))
    }
}

/// What happened to one command of a batch
#[derive(Debug)]
pub struct CommandOutcome {
    pub command: NftCommand,
    /// `None` when nft accepted the command
    pub error: Option<Error>,
    /// The command only succeeded after the base table was created
    pub retried: bool,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-command results of [`execute_batch`], in execution order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<CommandOutcome>,
    pub table_initialized: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(CommandOutcome::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }
}

/// Batch execution policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOptions {
    /// Create the base table and retry once when nft reports it missing
    pub auto_init_table: bool,
}

/// Runs `commands` in order, continuing past failures.
///
/// With `auto_init_table`, the first command that fails because the table or
/// chain is absent triggers [`init_table`] once, then that command is
/// retried once. Later commands run normally against the new table.
///
/// Spawn failures are recorded per command like nft errors.
pub async fn execute_batch(
    runner: &impl NftRunner,
    commands: &[NftCommand],
    chain: &ChainRef,
    options: BatchOptions,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut init_attempted = false;

    for command in commands {
        let mut retried = false;
        let mut result = run_command(runner, command).await;

        if let Err(Error::CommandExecutionFailed { message, .. }) = &result
            && options.auto_init_table
            && !init_attempted
            && NftablesErrorPattern::is_missing_table(message)
        {
            init_attempted = true;
            warn!("Table {chain} missing, creating it and retrying");
            match init_table(runner, chain).await {
                Ok(()) => {
                    report.table_initialized = true;
                    retried = true;
                    result = run_command(runner, command).await;
                }
                Err(e) => warn!("Automatic table creation failed: {e}"),
            }
        }

        match &result {
            Ok(_) => info!("OK: {command}"),
            Err(e) => error!("FAILED: {command}: {e}"),
        }

        report.outcomes.push(CommandOutcome {
            command: command.clone(),
            error: result.err(),
            retried,
        });
    }

    info!(
        "Batch finished: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
    report
}
