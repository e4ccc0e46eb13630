//! Tick loop standing in for the host's cron timer.
//!
//! Each tick asks the scheduler whether the backup task is due and, if so,
//! runs the scheduled path (guarded backup plus log retention).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::engine::{BackupEngine, Outcome};

/// Run ticks every `tick` until `shutdown_rx` flips to `true` or closes.
pub async fn run(engine: Arc<BackupEngine>, tick: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    info!(tick_secs = tick.as_secs(), task = engine.task_name(), "backup daemon started");

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_tick(&engine).await;
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("backup daemon shutting down");
                    break;
                }
            }
        }
    }

    info!("backup daemon stopped");
}

/// One tick. Returns the outcome when a scheduled run was due.
pub async fn run_tick(engine: &BackupEngine) -> Option<Outcome> {
    let started = Instant::now();
    match engine.claim_due(Utc::now()).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("no scheduled backup due");
            return None;
        }
        Err(e) => {
            error!(error = %e, "failed to check backup schedule");
            return None;
        }
    }

    let outcome = engine.run_scheduled_from(started).await;
    match &outcome {
        Outcome::Success(receipt) => info!(
            log_id = receipt.log_id,
            remote_backup_id = receipt.remote_backup_id.as_deref().unwrap_or(""),
            "scheduled backup accepted"
        ),
        Outcome::Failure(err) => error!(
            retryable = err.is_retryable(),
            error = %err,
            "scheduled backup failed"
        ),
        Outcome::Skipped(reason) => info!(reason = %reason, "scheduled backup skipped"),
    }
    Some(outcome)
}
