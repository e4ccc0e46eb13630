//! Read models for dashboards, the CLI `status` command and diagnostics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::settings::{InstallTarget, Settings};
use crate::store::BackupLogEntry;

/// Snapshot of the engine for display.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Whether recurring backups are enabled.
    pub enabled: bool,
    /// Configured frequency in hours.
    pub frequency_hours: u8,
    /// Target install.
    pub target: InstallTarget,
    /// Next scheduled run, if any.
    pub next_run: Option<DateTime<Utc>>,
    /// Most recent backup log entry.
    pub last_log_entry: Option<BackupLogEntry>,
    /// Whether a scheduled run currently holds the execution lock.
    pub running: bool,
}

/// Result of the credential probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCheck {
    /// Whether the API accepted the credentials.
    pub ok: bool,
    /// Message for the user.
    pub message: String,
}

impl ConnectionCheck {
    /// Probe succeeded.
    pub fn success() -> Self {
        Self {
            ok: true,
            message: "API connection successful!".to_owned(),
        }
    }

    /// Probe failed with `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Which settings are present. Never carries secret values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPresence {
    /// API username set.
    pub username_set: bool,
    /// API password set.
    pub password_set: bool,
    /// Install id, if set.
    pub install_id: Option<String>,
    /// Notification address, if set.
    pub notification_email: Option<String>,
    /// Recurring backups enabled.
    pub enabled: bool,
    /// Frequency in hours.
    pub frequency_hours: u8,
}

impl From<&Settings> for ConfigPresence {
    fn from(settings: &Settings) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_owned());
        Self {
            username_set: !settings.credentials.username.is_empty(),
            password_set: !settings.credentials.password.is_empty(),
            install_id: non_empty(&settings.target.install_id),
            notification_email: non_empty(&settings.notification_email),
            enabled: settings.enabled,
            frequency_hours: settings.frequency_hours,
        }
    }
}

/// State of the execution lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockState {
    /// Whether a live lease exists.
    pub held: bool,
    /// How long the current holder has held it.
    pub age: Option<Duration>,
}

/// A registered interval as reported by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntervalCheck {
    /// Hours.
    pub hours: u8,
    /// Interval name.
    pub name: String,
    /// Whether the host scheduler knows the interval.
    pub registered: bool,
}

/// Full diagnostic report.
#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    /// Settings presence flags.
    pub config: ConfigPresence,
    /// Execution lock.
    pub lock: LockState,
    /// Next scheduled run.
    pub next_run: Option<DateTime<Utc>>,
    /// Interval registration for 1..=23 hours.
    pub intervals: Vec<IntervalCheck>,
    /// Most recent log entries, newest first.
    pub recent_logs: Vec<BackupLogEntry>,
    /// Credential probe, `None` when credentials are missing.
    pub connection: Option<ConnectionCheck>,
    /// Configuration problems to fix, empty when none.
    pub recommendations: Vec<String>,
}

/// Configuration problems worth reporting.
pub fn recommendations(config: &ConfigPresence, next_run: Option<DateTime<Utc>>) -> Vec<String> {
    let mut issues = Vec::new();
    if !config.username_set || !config.password_set {
        issues.push("Configure API credentials (wpe-backup configure)".to_owned());
    }
    if config.install_id.is_none() {
        issues.push("Detect and configure the current install (wpe-backup detect)".to_owned());
    }
    if config.notification_email.is_none() {
        issues.push("Add a notification email address (required by the WP Engine API)".to_owned());
    }
    if !config.enabled {
        issues.push("Enable automatic backups (wpe-backup toggle enable)".to_owned());
    } else if next_run.is_none() {
        issues.push("No backup run is scheduled; re-enable automatic backups".to_owned());
    }
    issues
}
