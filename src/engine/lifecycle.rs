//! One backup attempt: preconditions, log entry, remote request, verdict.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::api::wire::{parse_backup_ack, CreateBackupRequest};
use crate::api::{ApiError, HttpResponse, HttpTransport, RemoteApi};
use crate::config::ApiConfig;
use crate::settings::{Settings, SettingsStore};
use crate::store::{BackupKind, BackupLogStore, LogCompletion, LogStatus, NewLogEntry};

use super::outcome::{BackupError, BackupReceipt, ConfigError, Outcome};

/// Message of a freshly started log entry.
pub const INITIATED_MESSAGE: &str = "Backup initiated";

const ACCEPTED_MESSAGE: &str = "Backup request accepted for processing! Your backup is being created and you will receive an email notification when it completes.";
const CREATED_MESSAGE: &str =
    "Backup created successfully! You will receive an email notification when it completes.";

/// Drives backup requests against the remote API and records each attempt.
#[derive(Clone)]
pub struct BackupLifecycle {
    settings: Arc<dyn SettingsStore>,
    logs: Arc<dyn BackupLogStore>,
    api_config: ApiConfig,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for BackupLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupLifecycle")
            .field("api_base_url", &self.api_config.base_url)
            .finish_non_exhaustive()
    }
}

impl BackupLifecycle {
    /// Lifecycle over the given collaborators.
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        logs: Arc<dyn BackupLogStore>,
        api_config: ApiConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            settings,
            logs,
            api_config,
            transport,
        }
    }

    /// Authenticated client for the stored credentials.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when settings cannot be read, the
    /// credentials are incomplete, or the base URL is invalid.
    pub async fn api(&self) -> Result<(Settings, RemoteApi), ConfigError> {
        let settings = self
            .settings
            .get()
            .await
            .map_err(|e| ConfigError::Invalid(format!("failed to read settings: {e:#}")))?;
        let api = RemoteApi::new(
            &self.api_config,
            settings.credentials.clone(),
            Arc::clone(&self.transport),
        )
        .map_err(|e| match e {
            ApiError::MissingCredentials => ConfigError::MissingCredentials,
            other => ConfigError::Invalid(other.to_string()),
        })?;
        Ok((settings, api))
    }

    /// Request one backup.
    ///
    /// Preconditions are checked in order (credentials, install id,
    /// notification address) before anything is written. Once the `running`
    /// entry exists it is completed exactly once, whatever the response.
    pub async fn create_backup(&self, kind: BackupKind, description: Option<&str>) -> Outcome {
        self.create_backup_tracked(kind, description, &OnceLock::new())
            .await
    }

    /// Like [`create_backup`](Self::create_backup), publishing the id of the
    /// `running` entry into `started` as soon as it is written.
    ///
    /// A caller that loses the attempt to a fault can still complete that
    /// entry.
    pub async fn create_backup_tracked(
        &self,
        kind: BackupKind,
        description: Option<&str>,
        started: &OnceLock<i64>,
    ) -> Outcome {
        let (settings, api) = match self.api().await {
            Ok(ready) => ready,
            Err(e) => return refuse(kind, e),
        };
        if let Err(e) = check_preconditions(&settings) {
            return refuse(kind, e);
        }

        let log_id = match self
            .logs
            .insert(NewLogEntry::running(kind, INITIATED_MESSAGE, Utc::now()))
            .await
        {
            Ok(id) => {
                let _ = started.set(id);
                id
            }
            Err(e) => {
                error!(%kind, error = %e, "failed to record backup start");
                return Outcome::Failure(BackupError::Internal(format!(
                    "failed to record backup start: {e:#}"
                )));
            }
        };

        let install_id = settings.target.install_id.as_str();
        let request = CreateBackupRequest::new(&settings.notification_email, description);
        info!(%kind, log_id, install_id, "backup initiated");

        let (outcome, completion) = match api.create_backup(install_id, &request).await {
            Ok(response) if is_accepted(response.status) => accept(log_id, &response),
            Ok(response) => {
                let err = BackupError::from_status(response.status, &response.body);
                warn!(%kind, log_id, status = response.status, error = %err, "backup rejected");
                let completion = finished(LogStatus::Error, err.to_string(), None);
                (Outcome::Failure(err), completion)
            }
            Err(ApiError::Transport(t)) => {
                warn!(%kind, log_id, error = %t, "backup request failed");
                let completion = finished(LogStatus::Error, t.message.clone(), None);
                (Outcome::Failure(BackupError::Transport(t.message)), completion)
            }
            Err(other) => {
                error!(%kind, log_id, error = %other, "backup request could not be sent");
                let err = BackupError::Internal(other.to_string());
                let completion = finished(LogStatus::Error, err.to_string(), None);
                (Outcome::Failure(err), completion)
            }
        };

        if let Err(e) = self.logs.complete(log_id, completion).await {
            error!(log_id, error = %e, "failed to finalize backup log entry");
        }
        outcome
    }
}

/// Check the three preconditions in order.
///
/// # Errors
///
/// Returns the first missing piece.
pub fn check_preconditions(settings: &Settings) -> Result<(), ConfigError> {
    if !settings.credentials.is_complete() {
        return Err(ConfigError::MissingCredentials);
    }
    if settings.target.install_id.is_empty() {
        return Err(ConfigError::MissingTarget);
    }
    if settings.notification_email.is_empty() {
        return Err(ConfigError::MissingNotificationEmail);
    }
    Ok(())
}

fn is_accepted(status: u16) -> bool {
    matches!(status, 200 | 201 | 202)
}

fn refuse(kind: BackupKind, err: ConfigError) -> Outcome {
    warn!(%kind, error = %err, "backup not attempted");
    Outcome::Failure(BackupError::Configuration(err))
}

fn finished(status: LogStatus, message: String, remote_id: Option<String>) -> LogCompletion {
    LogCompletion {
        status,
        message,
        remote_backup_id: remote_id,
        completed_at: Utc::now(),
    }
}

fn accept(log_id: i64, response: &HttpResponse) -> (Outcome, LogCompletion) {
    let ack = parse_backup_ack(&response.body);
    let log_message = format!(
        "Backup {} (ID: {})",
        ack.status.as_deref().unwrap_or("created"),
        ack.backup_id.as_deref().unwrap_or("unknown"),
    );
    let message = if response.status == 202 {
        ACCEPTED_MESSAGE
    } else {
        CREATED_MESSAGE
    };
    info!(
        log_id,
        status = response.status,
        remote_backup_id = ack.backup_id.as_deref().unwrap_or(""),
        "backup accepted"
    );

    let receipt = BackupReceipt {
        log_id,
        http_status: response.status,
        remote_backup_id: ack.backup_id.clone(),
        remote_status: ack.status,
        message: message.to_owned(),
    };
    let completion = finished(LogStatus::Success, log_message, ack.backup_id);
    (Outcome::Success(receipt), completion)
}
