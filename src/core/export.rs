//! Ruleset backup
//!
//! Writes the JSON listing of the full ruleset to a timestamped file.

use crate::core::error::{Error, Result};
use crate::core::executor::{NftRunner, list_ruleset};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

/// A written backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub path: PathBuf,
    pub bytes: usize,
    /// SHA-256 of the file contents, lowercase hex
    pub checksum: String,
}

/// Computes SHA-256 checksum of the exported text.
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lists the ruleset and writes the listing verbatim into `dir` under a
/// timestamped name.
///
/// # Errors
///
/// See [`export_ruleset_to`].
pub async fn export_ruleset(runner: &impl NftRunner, dir: &Path) -> Result<ExportRecord> {
    let path = dir.join(crate::utils::export_file_name(&chrono::Local::now()));
    export_ruleset_to(runner, path).await
}

/// Lists the ruleset and writes the listing verbatim to `path`.
///
/// # Errors
///
/// Returns `Err` if listing fails, nft produced something other than JSON,
/// or the file cannot be written. An existing file is never overwritten.
pub async fn export_ruleset_to(runner: &impl NftRunner, path: PathBuf) -> Result<ExportRecord> {
    let listing = list_ruleset(runner).await?;
    let value: Value = serde_json::from_str(&listing)
        .map_err(|e| Error::RulesetParse(format!("nft returned invalid JSON: {e}")))?;
    if value.get("nftables").is_none() {
        return Err(Error::RulesetParse(
            "listing has no 'nftables' array".to_string(),
        ));
    }

    write_new_file(&path, &listing).await?;

    info!("Ruleset exported to {}", path.display());
    Ok(ExportRecord {
        bytes: listing.len(),
        checksum: compute_checksum(&listing),
        path,
    })
}

async fn write_new_file(path: &Path, content: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::{RecordingRunner, SAMPLE_LISTING};

    #[test]
    fn test_compute_checksum_deterministic() {
        let a = compute_checksum("{\"nftables\":[]}");
        assert_eq!(a, compute_checksum("{\"nftables\":[]}"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, compute_checksum("{\"nftables\":[{}]}"));
    }

    #[tokio::test]
    async fn test_export_writes_listing_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new(|_| Ok(RecordingRunner::ok(SAMPLE_LISTING)));

        let record = export_ruleset(&runner, dir.path()).await.unwrap();

        let name = record.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("nft_rules_backup_"));
        assert!(name.ends_with(".json"));

        let written = std::fs::read_to_string(&record.path).unwrap();
        assert_eq!(written, SAMPLE_LISTING);
        assert_eq!(written.len(), record.bytes);
        assert_eq!(compute_checksum(&written), record.checksum);
        let value: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["nftables"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_export_rejects_non_json() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new(|_| Ok(RecordingRunner::ok("table ip filter {}")));
        let err = export_ruleset(&runner, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::RulesetParse(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_export_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(&path, "keep").unwrap();
        let runner = RecordingRunner::new(|_| Ok(RecordingRunner::ok(SAMPLE_LISTING)));

        let err = export_ruleset_to(&runner, path.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep");
    }

    #[tokio::test]
    async fn test_export_propagates_list_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new(|_| Ok(RecordingRunner::fail("Operation not permitted")));
        let err = export_ruleset(&runner, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::CommandExecutionFailed { .. }));
    }
}
