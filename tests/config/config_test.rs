//! Coverage for config parsing, env overrides and path resolution.

use std::path::PathBuf;

use wpe_backup::config::{data_dir, AppConfig, DEFAULT_API_BASE_URL};
use wpe_backup::engine::GuardConfig;

#[test]
fn data_dir_resolves_under_home() {
    let dir = data_dir().expect("data dir should resolve");
    assert!(dir.ends_with(".wpe-backup"));
}

#[test]
fn default_paths_live_in_data_dir() {
    let config = AppConfig::default();
    let dir = data_dir().expect("data dir should resolve");
    assert_eq!(config.storage.database, dir.join("backup.db"));
    assert_eq!(config.storage.settings, dir.join("settings.toml"));
    assert_eq!(config.storage.env_file, dir.join(".env"));
    assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
}

#[test]
fn empty_toml_is_all_defaults() {
    let config = AppConfig::from_toml("").expect("should parse");
    assert_eq!(config.schedule.tick_secs, 60);
    assert_eq!(config.schedule.task_name, "wpengine_backup_cron_hook");
    assert_eq!(config.retention.max_entries, 100);
}

#[test]
fn full_toml_overrides_every_section() {
    let config = AppConfig::from_toml(
        r#"
[api]
base_url = "https://api.staging.invalid/v1"
read_timeout_secs = 10
backup_timeout_secs = 60
user_agent = "ops-backup/1"

[schedule]
tick_secs = 30
budget_secs = 40
min_remaining_secs = 5
lock_ttl_secs = 600
task_name = "nightly"

[storage]
database = "/srv/backup/state.db"
settings = "/srv/backup/settings.toml"
logs_dir = "/var/log/wpe-backup"
env_file = "/srv/backup/.env"

[retention]
max_entries = 25
"#,
    )
    .expect("should parse");

    assert_eq!(config.api.user_agent, "ops-backup/1");
    assert_eq!(config.api.read_timeout().as_secs(), 10);
    assert_eq!(config.schedule.task_name, "nightly");
    assert_eq!(config.storage.logs_dir, PathBuf::from("/var/log/wpe-backup"));
    assert_eq!(config.retention.max_entries, 25);

    let guard = GuardConfig::from(&config.schedule);
    assert_eq!(guard.budget.as_secs(), 40);
    assert_eq!(guard.min_remaining.as_secs(), 5);
    assert_eq!(guard.lock_ttl.as_secs(), 600);
}

#[test]
fn malformed_toml_is_an_error() {
    assert!(AppConfig::from_toml("[schedule\ntick_secs = 1").is_err());
    assert!(AppConfig::from_toml("[schedule]\ntick_secs = \"soon\"").is_err());
}

#[test]
fn every_storage_path_can_come_from_env() {
    let mut config = AppConfig::default();
    config.apply_overrides(|key| match key {
        "WPE_BACKUP_API_URL" => Some("http://127.0.0.1:8080/v1".to_owned()),
        "WPE_BACKUP_DATABASE" => Some("/tmp/a.db".to_owned()),
        "WPE_BACKUP_SETTINGS" => Some("/tmp/s.toml".to_owned()),
        "WPE_BACKUP_LOGS_DIR" => Some("/tmp/logs".to_owned()),
        _ => None,
    });

    assert_eq!(config.api.base_url, "http://127.0.0.1:8080/v1");
    assert_eq!(config.storage.database, PathBuf::from("/tmp/a.db"));
    assert_eq!(config.storage.settings, PathBuf::from("/tmp/s.toml"));
    assert_eq!(config.storage.logs_dir, PathBuf::from("/tmp/logs"));
}

#[test]
fn zero_tick_override_is_ignored() {
    let mut config = AppConfig::default();
    config.apply_overrides(|key| (key == "WPE_BACKUP_TICK_SECS").then(|| "0".to_owned()));
    assert_eq!(config.schedule.tick_secs, 60);
}

#[test]
fn config_path_defaults_to_data_dir() {
    let path = AppConfig::config_path_with(|_| None).expect("should resolve");
    assert_eq!(path, data_dir().expect("data dir").join("config.toml"));
}
