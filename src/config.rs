//! Runtime configuration loading.
//!
//! Loads `config.toml` from `$WPE_BACKUP_CONFIG` or the data directory.
//! Environment variables override file values; file values override defaults.
//!
//! User-owned backup settings (credentials, target install, frequency) are not
//! part of this file. They live in the settings store, see [`crate::settings`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default WP Engine API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.wpengineapi.com/v1";

/// Name of the data directory under the user's home.
const DATA_DIR_NAME: &str = ".wpe-backup";

// ── Top-level config ────────────────────────────────────────────

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote API endpoint and timeouts.
    pub api: ApiConfig,
    /// Tick loop and execution guard timing.
    pub schedule: ScheduleConfig,
    /// Filesystem locations for persistent state.
    pub storage: StorageConfig,
    /// Backup log retention.
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// A missing config file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let path = Self::config_path_with(env)?;
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read config at {}: {e}",
                    path.display()
                ))
            }
        };
        config.apply_overrides(env);
        Ok(config)
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Resolve the config file path using a custom env resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if no env override is set and the home directory
    /// cannot be determined.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
        if let Some(p) = env("WPE_BACKUP_CONFIG") {
            return Ok(PathBuf::from(p));
        }
        Ok(data_dir()?.join("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never mutate the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("WPE_BACKUP_API_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = env("WPE_BACKUP_DATABASE") {
            self.storage.database = PathBuf::from(v);
        }
        if let Some(v) = env("WPE_BACKUP_SETTINGS") {
            self.storage.settings = PathBuf::from(v);
        }
        if let Some(v) = env("WPE_BACKUP_LOGS_DIR") {
            self.storage.logs_dir = PathBuf::from(v);
        }
        if let Some(v) = env("WPE_BACKUP_TICK_SECS") {
            match v.parse::<u64>() {
                Ok(n) if n > 0 => self.schedule.tick_secs = n,
                _ => tracing::warn!(
                    var = "WPE_BACKUP_TICK_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }
}

/// Resolve the default data directory (`~/.wpe-backup/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn data_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(DATA_DIR_NAME))
}

fn default_data_path(file: &str) -> PathBuf {
    data_dir()
        .unwrap_or_else(|_| PathBuf::from(DATA_DIR_NAME))
        .join(file)
}

// ── API config ──────────────────────────────────────────────────

/// Remote API endpoint and per-call timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.wpengineapi.com/v1`.
    pub base_url: String,
    /// Timeout for listing and probe requests, in seconds.
    pub read_timeout_secs: u64,
    /// Timeout for the backup creation POST, in seconds.
    pub backup_timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl ApiConfig {
    /// Timeout for GET requests.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Timeout for backup creation.
    pub fn backup_timeout(&self) -> Duration {
        Duration::from_secs(self.backup_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_owned(),
            read_timeout_secs: 30,
            backup_timeout_secs: 120,
            user_agent: format!("wpe-backup/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ── Schedule config ─────────────────────────────────────────────

/// Tick loop and execution guard timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between daemon ticks.
    pub tick_secs: u64,
    /// Wall-clock budget for one scheduled execution, in seconds.
    pub budget_secs: u64,
    /// Minimum remaining budget required to dispatch the remote call.
    pub min_remaining_secs: u64,
    /// Time-to-live of the execution lock, in seconds.
    pub lock_ttl_secs: u64,
    /// Name of the recurring task in the host scheduler.
    pub task_name: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            budget_secs: 50,
            min_remaining_secs: 10,
            lock_ttl_secs: 300,
            task_name: "wpengine_backup_cron_hook".to_owned(),
        }
    }
}

// ── Storage config ──────────────────────────────────────────────

/// Filesystem locations for persistent state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding backup logs, the execution lock and schedules.
    pub database: PathBuf,
    /// TOML file holding the user settings record.
    pub settings: PathBuf,
    /// Directory for rotated JSON log files.
    pub logs_dir: PathBuf,
    /// Optional `.env` file overriding the stored API credentials.
    pub env_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_data_path("backup.db"),
            settings: default_data_path("settings.toml"),
            logs_dir: default_data_path("logs"),
            env_file: default_data_path(".env"),
        }
    }
}

// ── Retention config ────────────────────────────────────────────

/// Backup log retention.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Number of most recent log entries kept after each scheduled tick.
    pub max_entries: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}

// ── Tests ───────────────────────────────────────────────────────
