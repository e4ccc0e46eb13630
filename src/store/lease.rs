//! Keyed leases with a time-to-live.
//!
//! A lease is acquired atomically: the insert succeeds when no row exists
//! for the key or the existing row has expired. Expiry only matters after a
//! crash; a healthy holder always releases explicitly.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{decode_timestamp, encode_timestamp};

/// A held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Lease key.
    pub key: String,
    /// When the lease was taken.
    pub acquired_at: DateTime<Utc>,
    /// When the lease stops excluding other holders.
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Whether the lease still excludes other holders at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Time since acquisition, zero if the clock went backwards.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.acquired_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Storage for keyed leases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take the lease unless a live one exists. Returns `None` when held.
    ///
    /// # Errors
    ///
    /// Returns an error if the TTL is out of range or the write fails.
    async fn try_acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> anyhow::Result<Option<Lease>>;

    /// Drop the lease, whoever holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn release(&self, key: &str) -> anyhow::Result<()>;

    /// The live lease for `key` at `now`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn current(&self, key: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Lease>>;
}

/// [`LeaseStore`] backed by the `leases` table.
#[derive(Debug, Clone)]
pub struct SqliteLeaseStore {
    pool: SqlitePool,
}

impl SqliteLeaseStore {
    /// Wrap a pool whose schema is already applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseStore for SqliteLeaseStore {
    async fn try_acquire(
        &self,
        key: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> anyhow::Result<Option<Lease>> {
        let ttl = chrono::Duration::from_std(ttl).context("lease TTL out of range")?;
        let expires_at = now
            .checked_add_signed(ttl)
            .context("lease expiry overflows")?;

        let result = sqlx::query(
            "INSERT INTO leases (key, acquired_at, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 acquired_at = excluded.acquired_at,
                 expires_at = excluded.expires_at
             WHERE leases.expires_at <= excluded.acquired_at",
        )
        .bind(key)
        .bind(encode_timestamp(now))
        .bind(encode_timestamp(expires_at))
        .execute(&self.pool)
        .await
        .context("failed to acquire lease")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(Lease {
            key: key.to_owned(),
            acquired_at: now,
            expires_at,
        }))
    }

    async fn release(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM leases WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("failed to release lease")?;
        Ok(())
    }

    async fn current(&self, key: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Lease>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT acquired_at, expires_at FROM leases WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read lease")?;

        let Some((acquired_at, expires_at)) = row else {
            return Ok(None);
        };
        let lease = Lease {
            key: key.to_owned(),
            acquired_at: decode_timestamp(&acquired_at)?,
            expires_at: decode_timestamp(&expires_at)?,
        };
        Ok(lease.is_live(now).then_some(lease))
    }
}
