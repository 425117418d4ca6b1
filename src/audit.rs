/// Audit logging for operations that change or copy the live ruleset
///
/// Events are appended as JSON lines to `audit.log` in the state directory.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AddRules,
    DeleteRules,
    InitTable,
    ExportRuleset,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub event_type: EventType,

    /// Whether every command of the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens the log in the state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: path.into(),
        }
    }

    /// Appends an event to the audit log
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Reads the most recent events, newest first
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

async fn record(event: AuditEvent) {
    if let Ok(audit) = AuditLog::new()
        && let Err(e) = audit.log(&event).await
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }
}

/// Logs an add batch
///
/// # Arguments
///
/// * `commands` - Every command of the batch, in execution order
/// * `failed` - How many of them nft rejected
/// * `table_initialized` - Whether the base table was created mid-batch
pub async fn log_add_rules(
    chain: &str,
    commands: &[String],
    failed: usize,
    table_initialized: bool,
    error: Option<String>,
) {
    record(AuditEvent::new(
        EventType::AddRules,
        failed == 0,
        serde_json::json!({
            "chain": chain,
            "commands": commands,
            "failed": failed,
            "table_initialized": table_initialized,
        }),
        error,
    ))
    .await;
}

/// Logs a delete batch with the handles it targeted
pub async fn log_delete_rules(chain: &str, handles: &[u64], failed: usize, error: Option<String>) {
    record(AuditEvent::new(
        EventType::DeleteRules,
        failed == 0,
        serde_json::json!({
            "chain": chain,
            "handles": handles,
            "failed": failed,
        }),
        error,
    ))
    .await;
}

/// Logs an explicit or automatic table creation
pub async fn log_init_table(table: &str, success: bool, error: Option<String>) {
    record(AuditEvent::new(
        EventType::InitTable,
        success,
        serde_json::json!({ "table": table }),
        error,
    ))
    .await;
}

/// Logs a ruleset export with the checksum of the written file
pub async fn log_export(path: Option<&Path>, checksum: Option<&str>, error: Option<String>) {
    record(AuditEvent::new(
        EventType::ExportRuleset,
        error.is_none(),
        serde_json::json!({
            "path": path.map(|p| p.display().to_string()),
            "sha256": checksum,
        }),
        error,
    ))
    .await;
}
