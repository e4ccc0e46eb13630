//! Single-flight wrapper around scheduled backups.
//!
//! A scheduled run takes the execution lease, checks how much of its
//! wall-clock budget is left, and only then dispatches the lifecycle. The
//! lease is released on every exit path; its TTL covers process crashes.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ScheduleConfig;
use crate::store::{
    BackupKind, BackupLogStore, LeaseStore, LogCompletion, LogStatus, NewLogEntry,
};

use super::lifecycle::BackupLifecycle;
use super::outcome::{BackupError, Outcome, SkipReason};

/// Key of the execution lease.
pub const LOCK_KEY: &str = "wpengine_backup_running";

/// Description sent with scheduled backups.
pub const SCHEDULED_DESCRIPTION: &str = "Automated scheduled backup";

/// Timing limits for one scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    /// Wall-clock budget measured from the start of the run.
    pub budget: Duration,
    /// Minimum budget that must remain to dispatch the remote call.
    pub min_remaining: Duration,
    /// Lease lifetime if the holder never releases it.
    pub lock_ttl: Duration,
}

impl From<&ScheduleConfig> for GuardConfig {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            budget: Duration::from_secs(config.budget_secs),
            min_remaining: Duration::from_secs(config.min_remaining_secs),
            lock_ttl: Duration::from_secs(config.lock_ttl_secs),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::from(&ScheduleConfig::default())
    }
}

/// Runs scheduled backups at most once at a time.
#[derive(Clone)]
pub struct ExecutionGuard {
    leases: Arc<dyn LeaseStore>,
    logs: Arc<dyn BackupLogStore>,
    lifecycle: BackupLifecycle,
    config: GuardConfig,
}

impl std::fmt::Debug for ExecutionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionGuard {
    /// Guard over the given lease store and lifecycle.
    pub fn new(
        leases: Arc<dyn LeaseStore>,
        logs: Arc<dyn BackupLogStore>,
        lifecycle: BackupLifecycle,
        config: GuardConfig,
    ) -> Self {
        Self {
            leases,
            logs,
            lifecycle,
            config,
        }
    }

    /// Whether a live execution lease exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease cannot be read.
    pub async fn is_running(&self) -> anyhow::Result<bool> {
        Ok(self.leases.current(LOCK_KEY, Utc::now()).await?.is_some())
    }

    /// Run one scheduled backup with the budget starting now.
    pub async fn run(&self) -> Outcome {
        self.run_from(Instant::now()).await
    }

    /// Run one scheduled backup whose budget started at `started`.
    pub async fn run_from(&self, started: Instant) -> Outcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("scheduled_backup", %run_id);
        self.run_locked(started).instrument(span).await
    }

    async fn run_locked(&self, started: Instant) -> Outcome {
        let acquired = self
            .leases
            .try_acquire(LOCK_KEY, Utc::now(), self.config.lock_ttl)
            .await;
        match acquired {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("skipping scheduled backup: already in progress");
                return Outcome::Skipped(SkipReason::AlreadyRunning);
            }
            Err(e) => {
                error!(error = %e, "failed to acquire execution lock");
                return Outcome::Failure(BackupError::Internal(format!(
                    "failed to acquire execution lock: {e:#}"
                )));
            }
        }

        let lease = LeaseGuard::new(Arc::clone(&self.leases));
        let outcome = self.dispatch(started).await;
        lease.release().await;

        info!(
            success = outcome.is_success(),
            skipped = outcome.is_skipped(),
            "scheduled backup finished"
        );
        outcome
    }

    async fn dispatch(&self, started: Instant) -> Outcome {
        let deadline = started
            .checked_add(self.config.budget)
            .unwrap_or(started);
        let remaining = deadline.saturating_duration_since(Instant::now());

        if remaining < self.config.min_remaining {
            let reason = SkipReason::InsufficientTime { remaining };
            warn!(
                remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                "skipping scheduled backup: budget exhausted"
            );
            self.record(LogStatus::Cancelled, reason.to_string()).await;
            return Outcome::Skipped(reason);
        }

        let lifecycle = self.lifecycle.clone();
        let started_entry = Arc::new(OnceLock::<i64>::new());
        let slot = Arc::clone(&started_entry);
        let task = tokio::spawn(
            async move {
                lifecycle
                    .create_backup_tracked(
                        BackupKind::Scheduled,
                        Some(SCHEDULED_DESCRIPTION),
                        &slot,
                    )
                    .await
            }
            .in_current_span(),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = BackupError::Internal(e.to_string());
                error!(error = %e, "scheduled backup faulted");
                if let Some(&log_id) = started_entry.get() {
                    self.finalize_orphan(log_id, err.to_string()).await;
                }
                self.record(LogStatus::Error, err.to_string()).await;
                Outcome::Failure(err)
            }
        }
    }

    /// Complete the `running` entry a faulted lifecycle left behind.
    async fn finalize_orphan(&self, log_id: i64, message: String) {
        let completion = LogCompletion {
            status: LogStatus::Error,
            message,
            remote_backup_id: None,
            completed_at: Utc::now(),
        };
        if let Err(e) = self.logs.complete(log_id, completion).await {
            warn!(log_id, error = %e, "could not complete faulted backup log entry");
        }
    }

    async fn record(&self, status: LogStatus, message: String) {
        let entry = NewLogEntry::terminal(BackupKind::Scheduled, status, message, Utc::now());
        if let Err(e) = self.logs.insert(entry).await {
            error!(error = %e, "failed to record scheduled backup outcome");
        }
    }
}

/// Releases the execution lease when dropped unless released explicitly.
struct LeaseGuard {
    leases: Arc<dyn LeaseStore>,
    released: bool,
}

impl LeaseGuard {
    fn new(leases: Arc<dyn LeaseStore>) -> Self {
        Self {
            leases,
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.leases.release(LOCK_KEY).await {
            error!(error = %e, "failed to release execution lock");
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let leases = Arc::clone(&self.leases);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = leases.release(LOCK_KEY).await {
                    error!(error = %e, "failed to release execution lock");
                }
            });
        }
    }
}
