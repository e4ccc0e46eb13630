//! SQLite persistence for backup logs, leases and scheduled tasks.
//!
//! Migration is applied inline via `include_str!` on open. Timestamps are
//! stored as fixed-width RFC 3339 UTC strings so lexical order is time order.

pub mod lease;
pub mod logs;

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use lease::{Lease, LeaseStore, SqliteLeaseStore};
pub use logs::{
    BackupKind, BackupLogEntry, BackupLogStore, LogCompletion, LogStatus, NewLogEntry,
    SqliteLogStore,
};

/// Handle to the engine's SQLite database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migration fails.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        let migration_sql = include_str!("../../migrations/001_backup_schema.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&pool)
            .await
            .context("failed to apply backup schema migration")?;

        Ok(Self { pool })
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Backup log store sharing this pool.
    pub fn log_store(&self) -> SqliteLogStore {
        SqliteLogStore::new(self.pool.clone())
    }

    /// Lease store sharing this pool.
    pub fn lease_store(&self) -> SqliteLeaseStore {
        SqliteLeaseStore::new(self.pool.clone())
    }
}

/// Format a timestamp for storage.
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// # Errors
///
/// Returns an error if the string is not RFC 3339.
pub fn decode_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid stored timestamp {raw:?}"))
}
