//! Persistent log of backup attempts.
//!
//! An entry is inserted when an attempt starts (`running`) and completed
//! exactly once. Retention deletes everything outside the newest `n` entries
//! by creation time.

use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{decode_timestamp, encode_timestamp};

/// Who initiated a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// User action (CLI, admin screen).
    Manual,
    /// Host scheduler tick.
    Scheduled,
}

impl BackupKind {
    /// Stored name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            other => Err(anyhow::anyhow!("unknown backup kind {other:?}")),
        }
    }
}

/// State of a backup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    /// Started, not yet finalized.
    Running,
    /// Accepted or completed by the remote API.
    Success,
    /// Failed.
    Error,
    /// Deliberately not performed.
    Cancelled,
}

impl LogStatus {
    /// Stored name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status is final.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(anyhow::anyhow!("unknown log status {other:?}")),
        }
    }
}

/// A log entry about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    /// Who initiated the attempt.
    pub kind: BackupKind,
    /// Initial status.
    pub status: LogStatus,
    /// Free-text message.
    pub message: String,
    /// Remote backup id, if already known.
    pub remote_backup_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time; set only for entries born terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

impl NewLogEntry {
    /// An attempt that has just started.
    pub fn running(kind: BackupKind, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            status: LogStatus::Running,
            message: message.into(),
            remote_backup_id: None,
            created_at: at,
            completed_at: None,
        }
    }

    /// An entry that is final the moment it is written (skips, faults,
    /// cancellations).
    pub fn terminal(
        kind: BackupKind,
        status: LogStatus,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            remote_backup_id: None,
            created_at: at,
            completed_at: Some(at),
        }
    }
}

/// Fields written when an attempt finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCompletion {
    /// Final status.
    pub status: LogStatus,
    /// Final message.
    pub message: String,
    /// Remote backup id, if the API returned one.
    pub remote_backup_id: Option<String>,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

/// A stored log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupLogEntry {
    /// Row id.
    pub id: i64,
    /// Who initiated the attempt.
    pub kind: BackupKind,
    /// Current status.
    pub status: LogStatus,
    /// Free-text message.
    pub message: String,
    /// Remote backup id.
    pub remote_backup_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time; `None` while running.
    pub completed_at: Option<DateTime<Utc>>,
}

impl BackupLogEntry {
    /// Message cut to `max_chars` for one-line display.
    pub fn display_message(&self, max_chars: usize) -> String {
        if self.message.chars().count() <= max_chars {
            return self.message.clone();
        }
        let cut = self
            .message
            .chars()
            .take(max_chars.saturating_sub(1))
            .collect::<String>();
        format!("{cut}…")
    }
}

/// Append/update/query access to the backup log.
#[async_trait]
pub trait BackupLogStore: Send + Sync {
    /// Insert an entry and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn insert(&self, entry: NewLogEntry) -> anyhow::Result<i64>;

    /// Finalize a running entry. An entry can be completed only once.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not exist, is already completed,
    /// or the write fails.
    async fn complete(&self, id: i64, completion: LogCompletion) -> anyhow::Result<()>;

    /// The newest `limit` entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn list_recent(&self, limit: u32) -> anyhow::Result<Vec<BackupLogEntry>>;

    /// Delete every entry outside the newest `keep`, returning the number
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn delete_excluding_top_n(&self, keep: u32) -> anyhow::Result<u64>;

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn count(&self) -> anyhow::Result<u64>;
}

/// [`BackupLogStore`] backed by the `backup_logs` table.
#[derive(Debug, Clone)]
pub struct SqliteLogStore {
    pool: SqlitePool,
}

type LogRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
);

impl SqliteLogStore {
    /// Wrap a pool whose schema is already applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn decode_row(row: LogRow) -> anyhow::Result<BackupLogEntry> {
        let (id, kind, status, message, remote_backup_id, created_at, completed_at) = row;
        Ok(BackupLogEntry {
            id,
            kind: kind.parse()?,
            status: status.parse()?,
            message,
            remote_backup_id,
            created_at: decode_timestamp(&created_at)?,
            completed_at: completed_at.as_deref().map(decode_timestamp).transpose()?,
        })
    }
}

#[async_trait]
impl BackupLogStore for SqliteLogStore {
    async fn insert(&self, entry: NewLogEntry) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO backup_logs (backup_type, status, message, backup_id, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(entry.kind.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.message)
        .bind(&entry.remote_backup_id)
        .bind(encode_timestamp(entry.created_at))
        .bind(entry.completed_at.map(encode_timestamp))
        .execute(&self.pool)
        .await
        .context("failed to insert backup log entry")?;

        Ok(result.last_insert_rowid())
    }

    async fn complete(&self, id: i64, completion: LogCompletion) -> anyhow::Result<()> {
        anyhow::ensure!(
            completion.status.is_terminal(),
            "cannot complete log entry {id} with non-terminal status"
        );

        let result = sqlx::query(
            "UPDATE backup_logs
             SET status = ?1, message = ?2, backup_id = COALESCE(?3, backup_id), completed_at = ?4
             WHERE id = ?5 AND completed_at IS NULL",
        )
        .bind(completion.status.as_str())
        .bind(&completion.message)
        .bind(&completion.remote_backup_id)
        .bind(encode_timestamp(completion.completed_at))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to complete backup log entry")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("backup log entry {id} is missing or already completed");
        }
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> anyhow::Result<Vec<BackupLogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, backup_type, status, message, backup_id, created_at, completed_at
             FROM backup_logs
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("failed to query backup logs")?;

        rows.into_iter().map(Self::decode_row).collect()
    }

    async fn delete_excluding_top_n(&self, keep: u32) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM backup_logs
             WHERE id NOT IN (
                 SELECT id FROM backup_logs
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1
             )",
        )
        .bind(i64::from(keep))
        .execute(&self.pool)
        .await
        .context("failed to trim backup logs")?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM backup_logs")
            .fetch_one(&self.pool)
            .await
            .context("failed to count backup logs")?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
