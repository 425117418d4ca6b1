use crate::core::firewall::ChainRef;
use crate::utils::get_data_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CONFIG_FILE: &str = "config.json";

/// Persistent settings for the target chain and execution behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_family")]
    pub family: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_chain")]
    pub chain: String,
    /// Show the command preview and ask before touching the ruleset
    #[serde(default = "default_true")]
    pub confirm_before_execute: bool,
    /// Create the base table and retry once when nft reports it missing
    #[serde(default = "default_true")]
    pub auto_init_table: bool,
    /// Where `export` writes backups; the working directory when unset
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            family: default_family(),
            table: default_table(),
            chain: default_chain(),
            confirm_before_execute: true,
            auto_init_table: true,
            export_dir: None,
        }
    }
}

fn default_family() -> String {
    "ip".to_string()
}

fn default_table() -> String {
    "filter".to_string()
}

fn default_chain() -> String {
    "input".to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn chain_ref(&self) -> ChainRef {
        ChainRef {
            family: self.family.clone(),
            table: self.table.clone(),
            chain: self.chain.clone(),
        }
    }

    /// Checks that every name can be placed into an nft command unquoted.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        crate::validators::validate_family(&self.family).map_err(|e| format!("family: {e}"))?;
        crate::validators::validate_object_name(&self.table).map_err(|e| format!("table: {e}"))?;
        crate::validators::validate_object_name(&self.chain).map_err(|e| format!("chain: {e}"))?;
        Ok(())
    }
}

/// Location of `config.json` in the data directory
pub fn config_path() -> Option<PathBuf> {
    get_data_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Saves the config to `path` using an atomic write pattern.
/// 1. Writes to a temporary file next to the target.
/// 2. Sets restrictive permissions (0o600).
/// 3. Atomically renames to the target path.
///
/// # Errors
///
/// Returns `Err` if the temporary file cannot be written or renamed.
pub async fn save_config_to(config: &AppConfig, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

/// Saves the config to the data directory.
///
/// # Errors
///
/// Returns `Err` if the data directory is unknown or the write fails.
pub async fn save_config(config: &AppConfig) -> std::io::Result<PathBuf> {
    crate::utils::ensure_dirs()?;
    let path = config_path().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "Data directory not found")
    })?;
    save_config_to(config, &path).await?;
    Ok(path)
}

/// Loads the config at `path`, or returns default if missing, unreadable or invalid.
pub async fn load_config_from(path: &Path) -> AppConfig {
    let Ok(json) = tokio::fs::read_to_string(path).await else {
        return AppConfig::default();
    };
    match serde_json::from_str::<AppConfig>(&json) {
        Ok(config) => match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Ignoring invalid config {}: {e}", path.display());
                AppConfig::default()
            }
        },
        Err(e) => {
            warn!("Ignoring unreadable config {}: {e}", path.display());
            AppConfig::default()
        }
    }
}

/// Loads the config from the data directory, or returns default if not found.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_ip_filter_input() {
        let config = AppConfig::default();
        assert_eq!(config.chain_ref(), ChainRef::default());
        assert!(config.confirm_before_execute);
        assert!(config.auto_init_table);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"chain": "services"}"#).unwrap();
        assert_eq!(config.family, "ip");
        assert_eq!(config.table, "filter");
        assert_eq!(config.chain, "services");
        assert!(config.auto_init_table);
    }

    #[test]
    fn test_validate_rejects_injection() {
        let config = AppConfig {
            chain: "input handle 1".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().unwrap_err().starts_with("chain:"));
        let config = AppConfig {
            family: "bridge".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = AppConfig {
            family: "inet".to_string(),
            table: "fw".to_string(),
            confirm_before_execute: false,
            export_dir: Some(PathBuf::from("/var/backups")),
            ..AppConfig::default()
        };

        save_config_to(&config, &path).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_config_from(&path).await, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json")).await;
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_load_invalid_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, r#"{"table": "bad name"}"#).await.unwrap();
        assert_eq!(load_config_from(&path).await, AppConfig::default());
        tokio::fs::write(&path, "not json").await.unwrap();
        assert_eq!(load_config_from(&path).await, AppConfig::default());
    }
}
