//! Tests for `src/logging.rs`.

use wpe_backup::logging::{filter, LoggingGuard, LOG_FILE_PREFIX};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn filter_falls_back_to_mode_default() {
    // Only the default level is observable without touching the process env.
    let rendered = filter("warn").to_string();
    assert!(rendered.contains("sqlx=warn"), "{rendered}");
}

#[test]
fn daemon_logging_writes_to_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    let guard = wpe_backup::logging::init_production(&logs_dir).expect("first init");
    tracing::info!(probe = true, "daemon logging probe");
    drop(guard);

    assert!(logs_dir.exists(), "logs directory should be created");
    let names: Vec<String> = std::fs::read_dir(&logs_dir)
        .expect("read logs dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(
        names.iter().any(|n| n.starts_with(LOG_FILE_PREFIX)),
        "{names:?}"
    );

    // The global subscriber can only be installed once.
    assert!(wpe_backup::logging::init_production(&logs_dir).is_err());
}
