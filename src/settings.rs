//! User settings record and the config store that owns it.
//!
//! One versioned record holds the API credentials, the target install, the
//! notification address, the backup frequency and the enabled flag. Defaults
//! and normalization are resolved here, once, so the engine never has to
//! second-guess an optional field.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::{self, ApiCredentials};

/// Current schema version of the settings record.
pub const SETTINGS_VERSION: u32 = 1;
/// Smallest allowed backup frequency in hours.
pub const MIN_FREQUENCY_HOURS: u8 = 1;
/// Largest allowed backup frequency in hours (daily).
pub const MAX_FREQUENCY_HOURS: u8 = 24;

/// Hosting environment of an install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Live site.
    Production,
    /// Staging copy.
    Staging,
    /// Development copy.
    Development,
    /// Not known or not reported.
    #[default]
    #[serde(other)]
    Unknown,
}

impl Environment {
    /// Map a `/nas/content/<segment>/` path segment to an environment.
    pub fn from_path_segment(segment: &str) -> Self {
        match segment {
            "live" | "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => Self::Development,
            _ => Self::Unknown,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The install backups are requested for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallTarget {
    /// Stable remote identifier; empty until resolved.
    pub install_id: String,
    /// Human-readable install name.
    pub install_name: String,
    /// Hosting environment.
    pub environment: Environment,
}

/// The single user settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Schema version.
    pub version: u32,
    /// API credentials.
    pub credentials: ApiCredentials,
    /// Target install.
    pub target: InstallTarget,
    /// Address the remote API notifies when a backup completes.
    pub notification_email: String,
    /// Backup frequency in hours, 1 to 24 inclusive.
    pub frequency_hours: u8,
    /// Whether the recurring task should be registered.
    pub enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            credentials: ApiCredentials::default(),
            target: InstallTarget::default(),
            notification_email: String::new(),
            frequency_hours: MAX_FREQUENCY_HOURS,
            enabled: false,
        }
    }
}

/// Reasons a settings record is rejected at the store boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// Frequency outside `[1, 24]`.
    #[error("frequency must be between 1 and 24 hours, got {0}")]
    FrequencyOutOfRange(u8),
    /// Notification address is not email-shaped.
    #[error("notification address {0:?} is not a valid email address")]
    InvalidEmail(String),
    /// Record was written by a newer schema.
    #[error("unsupported settings version {0}")]
    UnsupportedVersion(u32),
}

impl Settings {
    /// Trim free-text fields in place.
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.credentials.username);
        trim_in_place(&mut self.target.install_id);
        trim_in_place(&mut self.target.install_name);
        trim_in_place(&mut self.notification_email);
    }

    /// Validate the record.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.version > SETTINGS_VERSION {
            return Err(SettingsError::UnsupportedVersion(self.version));
        }
        validate_frequency(self.frequency_hours)?;
        if !self.notification_email.is_empty() && !is_email_shaped(&self.notification_email) {
            return Err(SettingsError::InvalidEmail(self.notification_email.clone()));
        }
        Ok(())
    }
}

/// Check a frequency against the allowed `[1, 24]` range.
///
/// # Errors
///
/// Returns [`SettingsError::FrequencyOutOfRange`] when outside the range.
pub fn validate_frequency(hours: u8) -> Result<(), SettingsError> {
    if (MIN_FREQUENCY_HOURS..=MAX_FREQUENCY_HOURS).contains(&hours) {
        Ok(())
    } else {
        Err(SettingsError::FrequencyOutOfRange(hours))
    }
}

/// Loose email shape check: one `@`, non-empty local part, dotted domain.
pub fn is_email_shaped(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !address.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_owned();
    }
}

// ── Store ───────────────────────────────────────────────────────

/// Read/write access to the settings record.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the current settings, falling back to defaults when none exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record cannot be read or parsed.
    async fn get(&self) -> anyhow::Result<Settings>;

    /// Replace the stored settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is invalid or cannot be written.
    async fn put(&self, settings: &Settings) -> anyhow::Result<()>;
}

/// Settings persisted as a private TOML file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
    env_file: Option<PathBuf>,
}

impl FileSettingsStore {
    /// Store backed by `path`, without a credentials overlay.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_file: None,
        }
    }

    /// Overlay credentials from a private `.env` file on every read.
    pub fn with_env_file(mut self, env_file: impl Into<PathBuf>) -> Self {
        self.env_file = Some(env_file.into());
        self
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSettingsStore {
    async fn read_stored(&self) -> anyhow::Result<Settings> {
        let mut settings = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => toml::from_str::<Settings>(&contents)
                .with_context(|| format!("failed to parse settings at {}", self.path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file, using defaults");
                Settings::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read settings at {}: {e}",
                    self.path.display()
                ))
            }
        };

        if settings.version > SETTINGS_VERSION {
            anyhow::bail!(SettingsError::UnsupportedVersion(settings.version));
        }
        settings.version = SETTINGS_VERSION;
        settings.normalize();
        Ok(settings)
    }

    fn env_overlay(&self) -> anyhow::Result<Option<ApiCredentials>> {
        match self.env_file {
            Some(ref env_file) => credentials::load_env_credentials(env_file),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self) -> anyhow::Result<Settings> {
        let mut settings = self.read_stored().await?;
        if let Some(overlay) = self.env_overlay()? {
            debug!("using credentials from env file");
            settings.credentials = overlay;
        }
        Ok(settings)
    }

    async fn put(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut record = settings.clone();
        record.version = SETTINGS_VERSION;
        record.normalize();
        record.validate()?;

        // Overlay credentials stay in the env file only.
        if let Some(overlay) = self.env_overlay()? {
            if record.credentials == overlay {
                record.credentials = self.read_stored().await?.credentials;
            }
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create settings directory {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(&record).context("failed to serialize settings")?;
        let tmp = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        credentials::enforce_private_file_permissions(&tmp)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}
