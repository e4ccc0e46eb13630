//! Host scheduler: named recurring tasks driven by the daemon tick.
//!
//! Intervals live in memory and are registered at startup. Task schedules
//! persist in the `scheduled_tasks` table so a restart keeps the next run.

pub mod intervals;

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::store::{decode_timestamp, encode_timestamp};

pub use intervals::{
    builtin_intervals, custom_intervals, resolve_interval_name, Interval, IntervalRegistry,
    DAILY_INTERVAL,
};

/// The scheduler that fires the backup task.
#[async_trait]
pub trait HostScheduler: Send + Sync {
    /// Add intervals. Existing names are replaced, never duplicated.
    async fn register_intervals(&self, intervals: BTreeMap<String, Interval>);

    /// All known intervals.
    async fn intervals(&self) -> BTreeMap<String, Interval>;

    /// When `task` runs next, if it is scheduled.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule cannot be read.
    async fn next_run_time(&self, task: &str) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Schedule `task` to recur on `interval_name`, first running at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is unknown or the write fails.
    async fn schedule(
        &self,
        task: &str,
        interval_name: &str,
        start: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Remove `task`'s schedule. Clearing an unscheduled task is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn clear(&self, task: &str) -> anyhow::Result<()>;

    /// Claim the run of `task` that is due at `now`, if any.
    ///
    /// A successful claim moves the next run past `now` by whole intervals, so
    /// runs missed while the process was down collapse into one.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule cannot be read or updated.
    async fn claim_due(&self, task: &str, now: DateTime<Utc>) -> anyhow::Result<bool>;
}

/// [`HostScheduler`] with schedules in SQLite.
#[derive(Debug)]
pub struct SqliteScheduler {
    pool: SqlitePool,
    intervals: RwLock<BTreeMap<String, Interval>>,
}

impl SqliteScheduler {
    /// Scheduler over `pool`, knowing only the built-in intervals.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            intervals: RwLock::new(builtin_intervals()),
        }
    }
}

#[async_trait]
impl HostScheduler for SqliteScheduler {
    async fn register_intervals(&self, intervals: BTreeMap<String, Interval>) {
        let count = intervals.len();
        self.intervals.write().await.extend(intervals);
        debug!(count, "registered intervals");
    }

    async fn intervals(&self) -> BTreeMap<String, Interval> {
        self.intervals.read().await.clone()
    }

    async fn next_run_time(&self, task: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT next_run_at FROM scheduled_tasks WHERE name = ?1")
                .bind(task)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read scheduled task")?;

        row.map(|(raw,)| decode_timestamp(&raw)).transpose()
    }

    async fn schedule(
        &self,
        task: &str,
        interval_name: &str,
        start: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let seconds = self
            .intervals
            .read()
            .await
            .get(interval_name)
            .map(|i| i.seconds)
            .with_context(|| format!("interval {interval_name:?} is not registered"))?;
        let seconds = i64::try_from(seconds).context("interval too long")?;

        sqlx::query(
            "INSERT INTO scheduled_tasks (name, interval_name, interval_secs, next_run_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                 interval_name = excluded.interval_name,
                 interval_secs = excluded.interval_secs,
                 next_run_at = excluded.next_run_at",
        )
        .bind(task)
        .bind(interval_name)
        .bind(seconds)
        .bind(encode_timestamp(start))
        .execute(&self.pool)
        .await
        .context("failed to schedule task")?;

        info!(task, interval = interval_name, next_run = %start, "task scheduled");
        Ok(())
    }

    async fn clear(&self, task: &str) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE name = ?1")
            .bind(task)
            .execute(&self.pool)
            .await
            .context("failed to clear scheduled task")?;
        if result.rows_affected() > 0 {
            info!(task, "task schedule cleared");
        }
        Ok(())
    }

    async fn claim_due(&self, task: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT interval_secs, next_run_at FROM scheduled_tasks WHERE name = ?1",
        )
        .bind(task)
        .fetch_optional(&self.pool)
        .await
        .context("failed to read scheduled task")?;

        let Some((interval_secs, raw_next)) = row else {
            return Ok(false);
        };
        let next_run = decode_timestamp(&raw_next)?;
        if next_run > now {
            return Ok(false);
        }

        let following = advance_past(next_run, interval_secs, now)?;

        // Compare-and-set on the old value so two tickers cannot both claim.
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET next_run_at = ?1 WHERE name = ?2 AND next_run_at = ?3",
        )
        .bind(encode_timestamp(following))
        .bind(task)
        .bind(&raw_next)
        .execute(&self.pool)
        .await
        .context("failed to advance scheduled task")?;

        let claimed = result.rows_affected() == 1;
        if claimed {
            debug!(task, due = %next_run, next_run = %following, "claimed due run");
        }
        Ok(claimed)
    }
}

/// First time strictly after `now` on the grid `due + k * interval_secs`.
fn advance_past(
    due: DateTime<Utc>,
    interval_secs: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<DateTime<Utc>> {
    anyhow::ensure!(interval_secs > 0, "interval must be positive");
    let behind = now.signed_duration_since(due).num_seconds().max(0);
    let steps = behind
        .checked_div(interval_secs)
        .and_then(|s| s.checked_add(1))
        .context("schedule step overflow")?;
    let offset = steps
        .checked_mul(interval_secs)
        .and_then(chrono::Duration::try_seconds)
        .context("schedule offset overflow")?;
    due.checked_add_signed(offset)
        .context("next run time out of range")
}
