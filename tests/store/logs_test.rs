//! SQLite backup log store.

use chrono::{DateTime, TimeZone, Utc};

use wpe_backup::store::{
    BackupKind, BackupLogStore, LogCompletion, LogStatus, NewLogEntry, SqliteLogStore,
};

use crate::support::open_db;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, hour, 0, 0)
        .single()
        .expect("valid date")
}

async fn store() -> (tempfile::TempDir, SqliteLogStore) {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs = open_db(&tmp).await.log_store();
    (tmp, logs)
}

#[tokio::test]
async fn running_entry_completes_once() {
    let (_tmp, logs) = store().await;
    let id = logs
        .insert(NewLogEntry::running(BackupKind::Manual, "Backup initiated", at(1)))
        .await
        .expect("insert");

    let running = logs.list_recent(1).await.expect("list");
    assert_eq!(running[0].status, LogStatus::Running);
    assert!(running[0].completed_at.is_none());

    let completion = LogCompletion {
        status: LogStatus::Success,
        message: "Backup requested (ID: 77)".to_owned(),
        remote_backup_id: Some("77".to_owned()),
        completed_at: at(2),
    };
    logs.complete(id, completion.clone()).await.expect("complete");

    let done = logs.list_recent(1).await.expect("list");
    assert_eq!(done[0].id, id);
    assert_eq!(done[0].status, LogStatus::Success);
    assert_eq!(done[0].message, "Backup requested (ID: 77)");
    assert_eq!(done[0].remote_backup_id.as_deref(), Some("77"));
    assert_eq!(done[0].created_at, at(1));
    assert_eq!(done[0].completed_at, Some(at(2)));

    assert!(logs.complete(id, completion).await.is_err(), "second completion must fail");
}

#[tokio::test]
async fn completion_must_be_terminal() {
    let (_tmp, logs) = store().await;
    let id = logs
        .insert(NewLogEntry::running(BackupKind::Scheduled, "Backup initiated", at(1)))
        .await
        .expect("insert");

    let result = logs
        .complete(
            id,
            LogCompletion {
                status: LogStatus::Running,
                message: "still going".to_owned(),
                remote_backup_id: None,
                completed_at: at(2),
            },
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn completing_unknown_entry_fails() {
    let (_tmp, logs) = store().await;
    let result = logs
        .complete(
            42,
            LogCompletion {
                status: LogStatus::Error,
                message: "x".to_owned(),
                remote_backup_id: None,
                completed_at: at(1),
            },
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn listing_orders_by_creation_time_then_id() {
    let (_tmp, logs) = store().await;
    for (hour, message) in [(3, "third"), (1, "first"), (2, "second-a"), (2, "second-b")] {
        logs.insert(NewLogEntry::terminal(
            BackupKind::Manual,
            LogStatus::Success,
            message,
            at(hour),
        ))
        .await
        .expect("insert");
    }

    let messages: Vec<String> = logs
        .list_recent(10)
        .await
        .expect("list")
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(messages, ["third", "second-b", "second-a", "first"]);

    assert_eq!(logs.list_recent(2).await.expect("list").len(), 2);
    assert_eq!(logs.count().await.expect("count"), 4);
}

#[tokio::test]
async fn terminal_entries_are_born_complete() {
    let (_tmp, logs) = store().await;
    logs.insert(NewLogEntry::terminal(
        BackupKind::Scheduled,
        LogStatus::Cancelled,
        "Scheduled backups cancelled by user",
        at(4),
    ))
    .await
    .expect("insert");

    let entry = logs.list_recent(1).await.expect("list").remove(0);
    assert_eq!(entry.kind, BackupKind::Scheduled);
    assert_eq!(entry.status, LogStatus::Cancelled);
    assert_eq!(entry.completed_at, Some(at(4)));
}

#[tokio::test]
async fn entries_survive_reopening() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    {
        let logs = open_db(&tmp).await.log_store();
        logs.insert(NewLogEntry::running(BackupKind::Manual, "Backup initiated", at(1)))
            .await
            .expect("insert");
    }

    let logs = open_db(&tmp).await.log_store();
    assert_eq!(logs.count().await.expect("count"), 1);
}
