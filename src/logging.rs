//! Structured logging via `tracing-subscriber` and `tracing-appender`.
//!
//! The daemon ([`init_production`]) writes JSON lines to a daily-rotated file
//! and human-readable lines to stderr. One-shot commands ([`init_cli`]) only
//! log warnings to stderr so their stdout stays scriptable.
//!
//! The filter comes from `WPE_BACKUP_LOG`, then `RUST_LOG`, then the mode's
//! default level.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Env var holding a filter directive for this binary.
pub const FILTER_ENV: &str = "WPE_BACKUP_LOG";

/// File name prefix of rotated daemon logs.
pub const LOG_FILE_PREFIX: &str = "wpe-backup.log";

/// Rotated log files kept on disk.
const MAX_LOG_FILES: usize = 14;

/// Dependencies that are chatty at `info`.
const QUIET_DEPENDENCIES: &[&str] = &["sqlx=warn", "hyper=warn", "hyper_util=warn", "reqwest=warn"];

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes pending entries, so hold it for the daemon's lifetime.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Initialise daemon logging under `logs_dir`.
///
/// # Errors
///
/// Returns an error if the directory or appender cannot be created, or a
/// global subscriber is already installed.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(logs_dir)
        .context("failed to create log file appender")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(non_blocking);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter("info"))
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .context("logging already initialised")?;

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise stderr-only logging for one-shot commands.
///
/// A second call is a no-op.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("warn"))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}

/// Build the filter for a mode whose default level is `default_level`.
pub fn filter(default_level: &str) -> EnvFilter {
    let base = std::env::var(FILTER_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default_level.to_owned());

    let directives = QUIET_DEPENDENCIES
        .iter()
        .copied()
        .chain(std::iter::once(base.as_str()))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(default_level))
}
