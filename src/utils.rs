//! Directory management and file naming
//!
//! # Directory Structure
//!
//! - Data: `~/.local/share/nftassist/` - `config.json`
//! - State: `~/.local/state/nftassist/` - `nftassist.log`, `audit.log`
//!
//! # Example
//!
//! ```
//! use nftassist::utils::{ensure_dirs, get_state_dir};
//!
//! ensure_dirs().expect("Failed to create directories");
//!
//! if let Some(state) = get_state_dir() {
//!     println!("logs in {}", state.display());
//! }
//! ```

use chrono::{DateTime, TimeZone};
use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "nftassist", "nftassist")
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().and_then(|pd| pd.state_dir().map(std::path::Path::to_path_buf))
}

pub fn ensure_dirs() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(0o700);
        builder.recursive(true);

        if let Some(dir) = get_data_dir() {
            builder.create(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            builder.create(dir)?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(dir) = get_data_dir() {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            std::fs::create_dir_all(dir)?;
        }
    }

    Ok(())
}

/// `nft_rules_backup_YYYYmmdd_HHMMSS.json` for the given instant
pub fn export_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("nft_rules_backup_{}.json", at.format("%Y%m%d_%H%M%S"))
}
