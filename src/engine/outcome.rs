//! Result taxonomy for backup attempts.

use std::fmt;
use std::time::Duration;

use crate::api::wire::extract_error_message;
use crate::api::ApiError;

/// A precondition the user has to fix before a backup can be requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// API username or password is empty.
    #[error("API username or password not configured. Please save your API credentials first.")]
    MissingCredentials,
    /// No install id is set.
    #[error(
        "Install ID not configured. Please run install auto-detection or set the install ID first."
    )]
    MissingTarget,
    /// No notification address is set; the API requires one.
    #[error(
        "Notification email is required for backups. Please add an email address to the backup settings."
    )]
    MissingNotificationEmail,
    /// The current host does not look like a hosted install.
    #[error(
        "Could not detect WP Engine install name. Auto-configuration must run on a WP Engine hosted site."
    )]
    InstallNotDetected,
    /// A detected install name has no matching install in the account.
    #[error(
        "Detected install name \"{0}\" but could not find a matching install ID via the API. Please check your API credentials."
    )]
    InstallNotFound(String),
    /// Settings could not be read or are otherwise invalid.
    #[error("{0}")]
    Invalid(String),
}

/// Why a backup attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackupError {
    /// Preconditions not met; no request was sent.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// No response from the API.
    #[error("Backup failed: {0}")]
    Transport(String),
    /// The API refused the request (non-5xx status).
    #[error("{category} {detail}")]
    RemoteRejection {
        /// HTTP status code.
        status: u16,
        /// Human-readable category for the status.
        category: String,
        /// Message extracted from the response body.
        detail: String,
    },
    /// The API failed server-side (5xx status).
    #[error("{category} {detail}")]
    RemoteServer {
        /// HTTP status code.
        status: u16,
        /// Human-readable category for the status.
        category: String,
        /// Message extracted from the response body.
        detail: String,
    },
    /// A fault inside the engine itself.
    #[error("Backup failed with unexpected fault: {0}")]
    Internal(String),
}

impl BackupError {
    /// Classify an unsuccessful HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let category = status_category(status);
        let detail = extract_error_message(body);
        if (500..600).contains(&status) {
            Self::RemoteServer {
                status,
                category,
                detail,
            }
        } else {
            Self::RemoteRejection {
                status,
                category,
                detail,
            }
        }
    }

    /// Whether the next scheduled tick may reasonably succeed without user
    /// action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RemoteServer { .. } => true,
            Self::RemoteRejection { status, .. } => *status == 429,
            Self::Configuration(_) | Self::Internal(_) => false,
        }
    }

    /// HTTP status, when the failure came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RemoteRejection { status, .. } | Self::RemoteServer { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Failure of a read-only API lookup (install listing, backup listing,
/// auto-configuration).
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Preconditions not met; no request was sent.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// The request failed or returned an unexpected response.
    #[error("Failed to fetch from WP Engine API: {0}")]
    Api(#[from] ApiError),
    /// Storing the result failed.
    #[error("failed to save settings: {0}")]
    Store(String),
}

/// Category sentence prefixed to API error details.
pub fn status_category(status: u16) -> String {
    let fixed = match status {
        400 => "Bad request - The API request format is invalid.",
        401 => "Authentication failed - Please check your API credentials.",
        403 => "Access denied - You may not have permission to create backups for this install.",
        404 => "Install not found - Please check your install ID.",
        405 => "Method not allowed - The backup endpoint may not be available.",
        429 => "Too many requests - Please wait before creating another backup.",
        500 => "Server error - Please try again later or contact WP Engine support.",
        other => return format!("HTTP {other} error:"),
    };
    fixed.to_owned()
}

/// Why a backup was deliberately not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another scheduled run holds the execution lock.
    AlreadyRunning,
    /// Too little of the execution budget was left to dispatch safely.
    InsufficientTime {
        /// Budget left at dispatch time.
        remaining: Duration,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => f.write_str("Backup skipped: a backup is already in progress"),
            Self::InsufficientTime { .. } => {
                f.write_str("Backup skipped: insufficient time remaining for safe execution")
            }
        }
    }
}

/// Details of an accepted backup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReceipt {
    /// Log entry recording the attempt.
    pub log_id: i64,
    /// HTTP status of the acceptance (200, 201 or 202).
    pub http_status: u16,
    /// Remote backup id, when the response carried one.
    pub remote_backup_id: Option<String>,
    /// Remote status, when the response carried one.
    pub remote_status: Option<String>,
    /// Message for the user.
    pub message: String,
}

impl BackupReceipt {
    /// Whether the API only queued the backup (202).
    pub fn is_processing(&self) -> bool {
        self.http_status == 202
    }
}

/// Result of a backup operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The API accepted the request.
    Success(BackupReceipt),
    /// The attempt failed.
    Failure(BackupError),
    /// Nothing was attempted, on purpose.
    Skipped(SkipReason),
}

impl Outcome {
    /// Whether the API accepted a backup.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the attempt failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Whether the attempt was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Message for the user.
    pub fn message(&self) -> String {
        match self {
            Self::Success(receipt) => receipt.message.clone(),
            Self::Failure(err) => err.to_string(),
            Self::Skipped(reason) => reason.to_string(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
