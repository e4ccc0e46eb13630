//! SQLite-backed host scheduler.

use chrono::{DateTime, TimeZone, Utc};

use wpe_backup::schedule::{custom_intervals, HostScheduler, SqliteScheduler};

use crate::support::open_db;

const TASK: &str = "wpengine_backup_cron_hook";

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, hour, minute, 0)
        .single()
        .expect("valid date")
}

async fn scheduler() -> (tempfile::TempDir, SqliteScheduler) {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = open_db(&tmp).await;
    let scheduler = SqliteScheduler::new(db.pool().clone());
    scheduler.register_intervals(custom_intervals()).await;
    (tmp, scheduler)
}

#[tokio::test]
async fn unknown_interval_is_rejected() {
    let (_tmp, scheduler) = scheduler().await;
    let result = scheduler.schedule(TASK, "every_30_hours", at(0, 0)).await;
    assert!(result.is_err());
    assert!(scheduler.next_run_time(TASK).await.expect("read").is_none());
}

#[tokio::test]
async fn custom_interval_needs_registration() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = open_db(&tmp).await;
    let bare = SqliteScheduler::new(db.pool().clone());

    assert!(bare.schedule(TASK, "every_6_hours", at(0, 0)).await.is_err());
    assert!(bare.schedule(TASK, "daily", at(0, 0)).await.is_ok());
}

#[tokio::test]
async fn due_run_is_claimed_once() {
    let (_tmp, scheduler) = scheduler().await;
    scheduler
        .schedule(TASK, "every_2_hours", at(1, 0))
        .await
        .expect("schedule");

    assert!(!scheduler.claim_due(TASK, at(0, 59)).await.expect("claim"));
    assert!(scheduler.claim_due(TASK, at(1, 0)).await.expect("claim"));
    assert!(!scheduler.claim_due(TASK, at(1, 0)).await.expect("claim"));
    assert_eq!(
        scheduler.next_run_time(TASK).await.expect("read"),
        Some(at(3, 0))
    );
}

#[tokio::test]
async fn missed_runs_collapse_into_one() {
    let (_tmp, scheduler) = scheduler().await;
    scheduler
        .schedule(TASK, "hourly", at(1, 0))
        .await
        .expect("schedule");

    assert!(scheduler.claim_due(TASK, at(6, 30)).await.expect("claim"));
    assert_eq!(
        scheduler.next_run_time(TASK).await.expect("read"),
        Some(at(7, 0))
    );
    assert!(!scheduler.claim_due(TASK, at(6, 45)).await.expect("claim"));
}

#[tokio::test]
async fn rescheduling_replaces_and_clearing_removes() {
    let (_tmp, scheduler) = scheduler().await;
    scheduler
        .schedule(TASK, "every_4_hours", at(1, 0))
        .await
        .expect("schedule");
    scheduler
        .schedule(TASK, "every_8_hours", at(2, 0))
        .await
        .expect("reschedule");
    assert_eq!(
        scheduler.next_run_time(TASK).await.expect("read"),
        Some(at(2, 0))
    );

    scheduler.clear(TASK).await.expect("clear");
    assert!(scheduler.next_run_time(TASK).await.expect("read").is_none());
    assert!(!scheduler.claim_due(TASK, at(23, 0)).await.expect("claim"));

    // Clearing twice is fine.
    scheduler.clear(TASK).await.expect("clear");
}

#[tokio::test]
async fn schedule_survives_a_new_scheduler_instance() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    {
        let db = open_db(&tmp).await;
        let scheduler = SqliteScheduler::new(db.pool().clone());
        scheduler
            .schedule(TASK, "daily", at(5, 0))
            .await
            .expect("schedule");
    }

    let db = open_db(&tmp).await;
    let scheduler = SqliteScheduler::new(db.pool().clone());
    assert_eq!(
        scheduler.next_run_time(TASK).await.expect("read"),
        Some(at(5, 0))
    );
}
