//! Backup scheduling and execution engine.
//!
//! [`BackupEngine`] is the surface used by the CLI and the daemon. It owns
//! the lifecycle (one backup attempt), the execution guard (single-flight
//! scheduled runs within a time budget), log retention, the interval
//! registry, and schedule management.

pub mod guard;
pub mod lifecycle;
pub mod outcome;
pub mod retention;
pub mod status;

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::api::wire::{Install, RemoteBackup};
use crate::api::{ApiError, HttpTransport, ReqwestTransport};
use crate::config::{ApiConfig, AppConfig, ScheduleConfig};
use crate::resolver::{detect_install, HostHints, InstallResolver};
use crate::schedule::{resolve_interval_name, HostScheduler, IntervalRegistry, SqliteScheduler};
use crate::settings::{validate_frequency, FileSettingsStore, InstallTarget, SettingsStore};
use crate::store::{
    BackupKind, BackupLogEntry, BackupLogStore, Database, LeaseStore, LogStatus, NewLogEntry,
};

pub use guard::{ExecutionGuard, GuardConfig, LOCK_KEY};
pub use lifecycle::BackupLifecycle;
pub use outcome::{BackupError, BackupReceipt, ConfigError, LookupError, Outcome, SkipReason};
pub use status::{ConnectionCheck, DebugReport, EngineStatus, LockState};

/// Message recorded when the user cancels scheduled backups.
pub const CANCELLED_MESSAGE: &str = "Scheduled backups cancelled by user";

/// Log entries included in the debug report.
const DEBUG_LOG_ENTRIES: u32 = 5;

/// Collaborators of the engine.
pub struct EngineDeps {
    /// Config Store.
    pub settings: Arc<dyn SettingsStore>,
    /// Persistent Log Store.
    pub logs: Arc<dyn BackupLogStore>,
    /// Execution lock storage.
    pub leases: Arc<dyn LeaseStore>,
    /// Host scheduler.
    pub scheduler: Arc<dyn HostScheduler>,
    /// HTTP transport to the remote API.
    pub transport: Arc<dyn HttpTransport>,
    /// Remote API settings.
    pub api: ApiConfig,
    /// Guard timing and task name.
    pub schedule: ScheduleConfig,
    /// Log entries kept after each scheduled tick.
    pub retention_keep: u32,
}

/// Entry point for every engine operation.
pub struct BackupEngine {
    settings: Arc<dyn SettingsStore>,
    logs: Arc<dyn BackupLogStore>,
    leases: Arc<dyn LeaseStore>,
    scheduler: Arc<dyn HostScheduler>,
    lifecycle: BackupLifecycle,
    guard: ExecutionGuard,
    registry: Mutex<IntervalRegistry>,
    task_name: String,
    retention_keep: u32,
}

impl std::fmt::Debug for BackupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupEngine")
            .field("task_name", &self.task_name)
            .field("retention_keep", &self.retention_keep)
            .finish_non_exhaustive()
    }
}

impl BackupEngine {
    /// Engine over explicit collaborators.
    pub fn new(deps: EngineDeps) -> Self {
        let lifecycle = BackupLifecycle::new(
            Arc::clone(&deps.settings),
            Arc::clone(&deps.logs),
            deps.api,
            deps.transport,
        );
        let guard = ExecutionGuard::new(
            Arc::clone(&deps.leases),
            Arc::clone(&deps.logs),
            lifecycle.clone(),
            GuardConfig::from(&deps.schedule),
        );
        Self {
            settings: deps.settings,
            logs: deps.logs,
            leases: deps.leases,
            scheduler: deps.scheduler,
            lifecycle,
            guard,
            registry: Mutex::new(IntervalRegistry::new()),
            task_name: deps.schedule.task_name,
            retention_keep: deps.retention_keep,
        }
    }

    /// Engine wired to the SQLite database, the settings file and `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the HTTP client
    /// cannot be built.
    pub async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let db = Database::open(&config.storage.database).await?;
        let settings = FileSettingsStore::new(&config.storage.settings)
            .with_env_file(&config.storage.env_file);
        let transport = ReqwestTransport::new()?;

        let engine = Self::new(EngineDeps {
            settings: Arc::new(settings),
            logs: Arc::new(db.log_store()),
            leases: Arc::new(db.lease_store()),
            scheduler: Arc::new(SqliteScheduler::new(db.pool().clone())),
            transport: Arc::new(transport),
            api: config.api.clone(),
            schedule: config.schedule.clone(),
            retention_keep: config.retention.max_entries,
        });
        engine.register_intervals().await;
        Ok(engine)
    }

    /// Name of the recurring task in the host scheduler.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Hand the generated intervals to the host scheduler. Returns `false`
    /// when this engine already did.
    pub async fn register_intervals(&self) -> bool {
        let Some(intervals) = self.registry.lock().await.register() else {
            return false;
        };
        self.scheduler.register_intervals(intervals).await;
        true
    }

    /// Whether a scheduled run holds the execution lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be read.
    pub async fn is_running(&self) -> anyhow::Result<bool> {
        self.guard.is_running().await
    }

    /// One scheduled tick: the guarded backup followed by log retention.
    pub async fn run_scheduled(&self) -> Outcome {
        self.run_scheduled_from(Instant::now()).await
    }

    /// Like [`run_scheduled`](Self::run_scheduled) with the budget measured
    /// from `started`.
    pub async fn run_scheduled_from(&self, started: Instant) -> Outcome {
        let outcome = self.guard.run_from(started).await;
        if let Err(e) = retention::enforce(self.logs.as_ref(), self.retention_keep).await {
            warn!(error = %e, "backup log retention failed");
        }
        outcome
    }

    /// Run the scheduled path now, refusing if a scheduled run is in progress.
    pub async fn trigger_scheduled(&self) -> Outcome {
        match self.is_running().await {
            Ok(true) => {
                info!("trigger refused: scheduled backup in progress");
                Outcome::Skipped(SkipReason::AlreadyRunning)
            }
            Ok(false) => self.run_scheduled().await,
            Err(e) => {
                warn!(error = %e, "could not read execution lock, running anyway");
                self.run_scheduled().await
            }
        }
    }

    /// Manual backup. Does not take the execution lock; warns when a
    /// scheduled run holds it.
    pub async fn create_backup(&self, description: Option<&str>) -> Outcome {
        if matches!(self.is_running().await, Ok(true)) {
            warn!("manual backup requested while a scheduled backup is in progress");
        }
        self.lifecycle
            .create_backup(BackupKind::Manual, description)
            .await
    }

    /// Every install visible to the stored credentials.
    ///
    /// # Errors
    ///
    /// Returns a configuration error without any request when credentials
    /// are missing, or the API error that aborted the listing.
    pub async fn list_installs(&self) -> Result<Vec<Install>, LookupError> {
        Ok(self.resolver().await?.list_installs().await?)
    }

    /// Id of the install named `name`.
    ///
    /// # Errors
    ///
    /// As [`list_installs`](Self::list_installs).
    pub async fn resolve_id_by_name(&self, name: &str) -> Result<Option<String>, LookupError> {
        Ok(self.resolver().await?.resolve_id_by_name(name).await?)
    }

    /// Backups the API knows for the configured install.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when credentials or the install id are
    /// missing, or the API error.
    pub async fn list_remote_backups(&self) -> Result<Vec<RemoteBackup>, LookupError> {
        let (settings, api) = self.lifecycle.api().await?;
        if settings.target.install_id.is_empty() {
            return Err(ConfigError::MissingTarget.into());
        }
        Ok(api.list_backups(&settings.target.install_id).await?)
    }

    /// Probe the API with the stored credentials.
    pub async fn test_connection(&self) -> ConnectionCheck {
        let api = match self.lifecycle.api().await {
            Ok((_, api)) => api,
            Err(ConfigError::MissingCredentials) => {
                return ConnectionCheck::failure("Please enter both username and password.")
            }
            Err(e) => return ConnectionCheck::failure(e.to_string()),
        };
        match api.check_credentials().await {
            Ok(()) => ConnectionCheck::success(),
            Err(ApiError::Transport(t)) => {
                ConnectionCheck::failure(format!("Connection failed: {}", t.message))
            }
            Err(ApiError::HttpStatus { status, .. }) => ConnectionCheck::failure(format!(
                "API connection failed with status code: {status}"
            )),
            Err(e) => ConnectionCheck::failure(e.to_string()),
        }
    }

    /// Detect the current install, resolve its id and store it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when nothing is detected or no install
    /// matches, the API error when the listing fails, or a store error.
    pub async fn auto_configure(&self, hints: &HostHints) -> Result<InstallTarget, LookupError> {
        let detected = detect_install(hints).ok_or(ConfigError::InstallNotDetected)?;
        let install_id = self
            .resolve_id_by_name(&detected.name)
            .await?
            .ok_or_else(|| ConfigError::InstallNotFound(detected.name.clone()))?;

        let target = InstallTarget {
            install_id,
            install_name: detected.name,
            environment: detected.environment,
        };
        let mut settings = self
            .settings
            .get()
            .await
            .map_err(|e| LookupError::Store(format!("{e:#}")))?;
        settings.target = target.clone();
        self.settings
            .put(&settings)
            .await
            .map_err(|e| LookupError::Store(format!("{e:#}")))?;

        info!(
            install_id = %target.install_id,
            install_name = %target.install_name,
            environment = %target.environment,
            "install auto-configured"
        );
        Ok(target)
    }

    /// Bring the host schedule in line with the settings: clear the task,
    /// then schedule it from now when enabled. Returns the next run.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be read, the interval is not
    /// registered, or the schedule cannot be written.
    pub async fn apply_schedule(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        let settings = self.settings.get().await?;
        self.scheduler.clear(&self.task_name).await?;
        if !settings.enabled {
            return Ok(None);
        }

        self.register_intervals().await;
        let interval = resolve_interval_name(settings.frequency_hours);
        let start = Utc::now();
        self.scheduler
            .schedule(&self.task_name, &interval, start)
            .await?;
        self.scheduler.next_run_time(&self.task_name).await
    }

    /// Enable or disable recurring backups, optionally changing the
    /// frequency, and reapply the schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the frequency is outside `[1, 24]` or the
    /// settings or schedule cannot be written.
    pub async fn set_enabled(
        &self,
        enabled: bool,
        frequency_hours: Option<u8>,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        if let Some(hours) = frequency_hours {
            validate_frequency(hours)?;
        }
        let mut settings = self.settings.get().await?;
        settings.enabled = enabled;
        if let Some(hours) = frequency_hours {
            settings.frequency_hours = hours;
        }
        self.settings.put(&settings).await?;
        info!(enabled, frequency_hours = settings.frequency_hours, "backup schedule updated");
        self.apply_schedule().await
    }

    /// Clear the schedule, disable recurring backups and record the
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule, settings or log cannot be written.
    pub async fn cancel_schedule(&self) -> anyhow::Result<()> {
        self.scheduler.clear(&self.task_name).await?;
        let mut settings = self.settings.get().await?;
        settings.enabled = false;
        self.settings.put(&settings).await?;
        self.logs
            .insert(NewLogEntry::terminal(
                BackupKind::Scheduled,
                LogStatus::Cancelled,
                CANCELLED_MESSAGE,
                Utc::now(),
            ))
            .await
            .context("failed to record cancellation")?;
        info!("scheduled backups cancelled");
        Ok(())
    }

    /// Claim the scheduled run due at `now`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule cannot be read or updated.
    pub async fn claim_due(&self, now: DateTime<Utc>) -> anyhow::Result<bool> {
        self.scheduler.claim_due(&self.task_name, now).await
    }

    /// Most recent log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub async fn recent_logs(&self, limit: u32) -> anyhow::Result<Vec<BackupLogEntry>> {
        self.logs.list_recent(limit).await
    }

    /// Read model for dashboards.
    ///
    /// # Errors
    ///
    /// Returns an error if settings, schedule, log or lock cannot be read.
    pub async fn status(&self) -> anyhow::Result<EngineStatus> {
        let settings = self.settings.get().await?;
        let next_run = self.scheduler.next_run_time(&self.task_name).await?;
        let last_log_entry = self.logs.list_recent(1).await?.into_iter().next();
        Ok(EngineStatus {
            enabled: settings.enabled,
            frequency_hours: settings.frequency_hours,
            target: settings.target,
            next_run,
            last_log_entry,
            running: self.is_running().await?,
        })
    }

    /// Diagnostic report. Probes the API when credentials are present.
    ///
    /// # Errors
    ///
    /// Returns an error if settings, schedule, log or lock cannot be read.
    pub async fn debug_report(&self) -> anyhow::Result<DebugReport> {
        let settings = self.settings.get().await?;
        let config = status::ConfigPresence::from(&settings);
        let now = Utc::now();

        let lease = self.leases.current(LOCK_KEY, now).await?;
        let lock = LockState {
            held: lease.is_some(),
            age: lease.map(|l| l.age(now)),
        };

        let next_run = self.scheduler.next_run_time(&self.task_name).await?;
        let known = self.scheduler.intervals().await;
        let intervals = (1..crate::settings::MAX_FREQUENCY_HOURS)
            .map(|hours| {
                let name = resolve_interval_name(hours);
                status::IntervalCheck {
                    hours,
                    registered: known.contains_key(&name),
                    name,
                }
            })
            .collect();

        let recent_logs = self.logs.list_recent(DEBUG_LOG_ENTRIES).await?;
        let connection = if settings.credentials.is_complete() {
            Some(self.test_connection().await)
        } else {
            None
        };
        let recommendations = status::recommendations(&config, next_run);

        Ok(DebugReport {
            config,
            lock,
            next_run,
            intervals,
            recent_logs,
            connection,
            recommendations,
        })
    }

    async fn resolver(&self) -> Result<InstallResolver, ConfigError> {
        let (_, api) = self.lifecycle.api().await?;
        Ok(InstallResolver::new(api))
    }
}
