//! wpe-backup CLI entry point.
//!
//! `start` runs the scheduling daemon; every other subcommand performs one
//! engine operation and exits non-zero when it fails.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use wpe_backup::config::AppConfig;
use wpe_backup::credentials::ApiCredentials;
use wpe_backup::engine::{BackupEngine, DebugReport, EngineStatus, Outcome};
use wpe_backup::resolver::{detect_install, HostHints};
use wpe_backup::settings::{Environment, FileSettingsStore, SettingsStore};
use wpe_backup::store::BackupLogEntry;
use wpe_backup::{daemon, logging};

/// Scheduled off-site backups through the WP Engine hosting API.
#[derive(Parser)]
#[command(name = "wpe-backup", version, about)]
struct Cli {
    /// Print JSON instead of text where supported.
    #[arg(long, global = true)]
    json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the scheduling daemon until interrupted.
    Start,
    /// Run one scheduled backup now (guarded, with log retention).
    Run,
    /// Request a manual backup.
    Backup {
        /// Description attached to the backup.
        #[arg(long, default_value = "CLI backup")]
        description: String,
    },
    /// Show schedule, target and the latest backup attempt.
    Status,
    /// Enable or disable automatic backups.
    Toggle {
        /// Whether to enable or disable.
        action: ToggleAction,
        /// Backup frequency in hours (1-24).
        #[arg(long)]
        frequency: Option<u8>,
    },
    /// Cancel scheduled backups and disable automatic backups.
    Cancel,
    /// List installs visible to the configured credentials.
    Installs,
    /// Look up an install id by name.
    Resolve {
        /// Install name.
        name: String,
    },
    /// Detect the current install and store its id.
    Detect {
        /// Install path to inspect instead of the working directory.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Server name to inspect instead of `$SERVER_NAME`.
        #[arg(long)]
        server_name: Option<String>,
        /// Only report what was detected; do not call the API or save.
        #[arg(long)]
        dry_run: bool,
    },
    /// List backups the API knows for the configured install.
    Backups,
    /// Check the configured API credentials.
    TestApi,
    /// Print a diagnostic report.
    Debug {
        /// Include log messages.
        #[arg(long)]
        verbose: bool,
    },
    /// Update stored settings.
    Configure {
        /// API username.
        #[arg(long)]
        username: Option<String>,
        /// API password.
        #[arg(long)]
        password: Option<String>,
        /// Install id.
        #[arg(long)]
        install_id: Option<String>,
        /// Install name.
        #[arg(long)]
        install_name: Option<String>,
        /// Install environment.
        #[arg(long)]
        environment: Option<EnvironmentArg>,
        /// Notification email address.
        #[arg(long)]
        email: Option<String>,
        /// Backup frequency in hours (1-24).
        #[arg(long)]
        frequency: Option<u8>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ToggleAction {
    Enable,
    Disable,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvironmentArg {
    Production,
    Staging,
    Development,
}

impl From<EnvironmentArg> for Environment {
    fn from(arg: EnvironmentArg) -> Self {
        match arg {
            EnvironmentArg::Production => Self::Production,
            EnvironmentArg::Staging => Self::Staging,
            EnvironmentArg::Development => Self::Development,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;

    match cli.command {
        Command::Start => handle_start(config).await,
        command => {
            logging::init_cli();
            handle_command(command, &config, cli.json).await
        }
    }
}

/// Run a one-shot subcommand.
async fn handle_command(command: Command, config: &AppConfig, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Start => anyhow::bail!("the daemon is not a one-shot command"),
        Command::Run => {
            let engine = BackupEngine::open(config).await?;
            finish(&engine.trigger_scheduled().await)
        }
        Command::Backup { description } => {
            let engine = BackupEngine::open(config).await?;
            finish(&engine.create_backup(Some(&description)).await)
        }
        Command::Status => handle_status(config, json).await,
        Command::Toggle { action, frequency } => {
            let engine = BackupEngine::open(config).await?;
            let enable = matches!(action, ToggleAction::Enable);
            let next = engine
                .set_enabled(enable, if enable { frequency } else { None })
                .await?;
            match next {
                Some(at) => println!("Automatic backups enabled. Next backup: {at}"),
                None => println!("Automatic backups disabled."),
            }
            Ok(())
        }
        Command::Cancel => {
            let engine = BackupEngine::open(config).await?;
            engine.cancel_schedule().await?;
            println!(
                "All scheduled backups have been cancelled and automatic backups are now disabled."
            );
            Ok(())
        }
        Command::Installs => {
            let engine = BackupEngine::open(config).await?;
            let installs = engine.list_installs().await?;
            if json {
                return print_json(&installs);
            }
            for install in &installs {
                println!("{}\t{}\t{}", install.id, install.name, install.environment);
            }
            println!("{} installs", installs.len());
            Ok(())
        }
        Command::Resolve { name } => {
            let engine = BackupEngine::open(config).await?;
            match engine.resolve_id_by_name(&name).await? {
                Some(id) => {
                    println!("{id}");
                    Ok(())
                }
                None => anyhow::bail!("no install named {name:?}"),
            }
        }
        Command::Detect {
            path,
            server_name,
            dry_run,
        } => handle_detect(config, path, server_name, dry_run).await,
        Command::Backups => {
            let engine = BackupEngine::open(config).await?;
            let backups = engine.list_remote_backups().await?;
            if json {
                return print_json(&backups);
            }
            for backup in &backups {
                println!(
                    "{}\t{}\t{}\t{}",
                    backup.id,
                    backup.status.as_deref().unwrap_or("-"),
                    backup.created_at.as_deref().unwrap_or("-"),
                    backup.description.as_deref().unwrap_or(""),
                );
            }
            Ok(())
        }
        Command::TestApi => {
            let engine = BackupEngine::open(config).await?;
            let check = engine.test_connection().await;
            println!("{}", check.message);
            if check.ok {
                Ok(())
            } else {
                anyhow::bail!("API connection test failed")
            }
        }
        Command::Debug { verbose } => {
            let engine = BackupEngine::open(config).await?;
            let report = engine.debug_report().await?;
            if json {
                return print_json(&report);
            }
            print_debug_report(&report, verbose);
            Ok(())
        }
        Command::Configure {
            username,
            password,
            install_id,
            install_name,
            environment,
            email,
            frequency,
        } => {
            // Bare store: credentials from the .env overlay must not be
            // written into the settings file.
            let store = FileSettingsStore::new(&config.storage.settings);
            let mut settings = store.get().await?;
            if username.is_some() || password.is_some() {
                settings.credentials = ApiCredentials::new(
                    username.unwrap_or(settings.credentials.username),
                    password.unwrap_or(settings.credentials.password),
                );
            }
            if let Some(id) = install_id {
                settings.target.install_id = id;
            }
            if let Some(name) = install_name {
                settings.target.install_name = name;
            }
            if let Some(env) = environment {
                settings.target.environment = env.into();
            }
            if let Some(address) = email {
                settings.notification_email = address;
            }
            if let Some(hours) = frequency {
                settings.frequency_hours = hours;
            }
            store.put(&settings).await?;

            let engine = BackupEngine::open(config).await?;
            engine.apply_schedule().await?;
            println!("Settings saved to {}", store.path().display());
            Ok(())
        }
    }
}

/// Run the scheduling daemon.
async fn handle_start(config: AppConfig) -> anyhow::Result<()> {
    let _logging_guard = logging::init_production(&config.storage.logs_dir)?;

    let engine = Arc::new(BackupEngine::open(&config).await?);
    let status = engine.status().await?;
    if status.enabled && status.next_run.is_none() {
        engine.apply_schedule().await?;
    }

    info!(
        database = %config.storage.database.display(),
        settings = %config.storage.settings.display(),
        enabled = status.enabled,
        "wpe-backup daemon starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick = Duration::from_secs(config.schedule.tick_secs.max(1));
    let daemon_handle = tokio::spawn(daemon::run(Arc::clone(&engine), tick, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("received shutdown signal");
    // The receiver may already be gone if the daemon exited on its own.
    let _ = shutdown_tx.send(true);
    daemon_handle.await.context("daemon task panicked")?;
    Ok(())
}

async fn handle_status(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let engine = BackupEngine::open(config).await?;
    let status = engine.status().await?;
    if json {
        return print_json(&status);
    }
    print_status(&status);

    let recent = engine.recent_logs(5).await?;
    if recent.is_empty() {
        println!("No backup activity recorded.");
    } else {
        println!("Recent backup activity:");
        for entry in &recent {
            println!("  {}", format_log_line(entry, 80));
        }
    }
    Ok(())
}

async fn handle_detect(
    config: &AppConfig,
    path: Option<PathBuf>,
    server_name: Option<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut hints = HostHints::from_env();
    if path.is_some() {
        hints.install_path = path;
    }
    if server_name.is_some() {
        hints.server_name = server_name;
    }

    if dry_run {
        return match detect_install(&hints) {
            Some(found) => {
                println!("Install name: {}", found.name);
                println!("Environment: {}", found.environment);
                Ok(())
            }
            None => anyhow::bail!("no WP Engine install detected"),
        };
    }

    let engine = BackupEngine::open(config).await?;
    let target = engine.auto_configure(&hints).await?;
    println!(
        "Auto-detected install: {} (ID: {})",
        target.install_name, target.install_id
    );
    println!("Environment: {}", target.environment);
    Ok(())
}

fn finish(outcome: &Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::Failure(err) => anyhow::bail!("{err}"),
        Outcome::Success(receipt) => {
            println!("{}", receipt.message);
            if let Some(ref id) = receipt.remote_backup_id {
                println!("Backup ID: {id}");
            }
            Ok(())
        }
        Outcome::Skipped(reason) => {
            println!("{reason}");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn print_status(status: &EngineStatus) {
    if status.enabled {
        println!("Automatic backups: ENABLED");
        println!("  Frequency: every {} hours", status.frequency_hours);
        match status.next_run {
            Some(at) => println!("  Next backup: {at}"),
            None => println!("  Next backup: not scheduled"),
        }
    } else {
        println!("Automatic backups: DISABLED");
    }
    if status.target.install_id.is_empty() {
        println!("Install: not configured");
    } else {
        println!(
            "Install: {} (ID: {}, {})",
            status.target.install_name, status.target.install_id, status.target.environment
        );
    }
    if status.running {
        println!("A scheduled backup is in progress.");
    }
    println!();
}

fn print_debug_report(report: &DebugReport, verbose: bool) {
    let flag = |set: bool| if set { "SET" } else { "MISSING" };
    println!("=== wpe-backup debug report ===");
    println!();
    println!("Configuration:");
    println!("  API username: {}", flag(report.config.username_set));
    println!("  API password: {}", flag(report.config.password_set));
    println!(
        "  Install ID: {}",
        report.config.install_id.as_deref().unwrap_or("MISSING")
    );
    println!(
        "  Notification email: {}",
        report.config.notification_email.as_deref().unwrap_or("MISSING")
    );
    println!("  Enabled: {}", report.config.enabled);
    println!("  Frequency: {} hours", report.config.frequency_hours);
    println!();

    println!("Schedule:");
    match report.next_run {
        Some(at) => println!("  Next run: {at}"),
        None => println!("  Next run: none scheduled"),
    }
    let registered = report.intervals.iter().filter(|i| i.registered).count();
    println!(
        "  Custom intervals registered: {registered}/{}",
        report.intervals.len()
    );
    if verbose {
        for interval in &report.intervals {
            let mark = if interval.registered { "ok" } else { "missing" };
            println!("    {} ({mark})", interval.name);
        }
    }
    println!();

    println!("Execution lock:");
    match (report.lock.held, report.lock.age) {
        (true, Some(age)) => println!("  Held for {}s", age.as_secs()),
        (true, None) => println!("  Held"),
        (false, _) => println!("  Free"),
    }
    println!();

    println!("Recent backup activity:");
    if report.recent_logs.is_empty() {
        println!("  none");
    }
    for entry in &report.recent_logs {
        let width = if verbose { 500 } else { 60 };
        println!("  {}", format_log_line(entry, width));
    }
    println!();

    println!("API connection:");
    match report.connection {
        Some(ref check) => println!("  {}", check.message),
        None => println!("  cannot test, credentials missing"),
    }
    println!();

    println!("Recommendations:");
    if report.recommendations.is_empty() {
        println!("  No configuration issues found.");
    }
    for issue in &report.recommendations {
        println!("  - {issue}");
    }
}

fn format_log_line(entry: &BackupLogEntry, width: usize) -> String {
    format!(
        "{} {} ({}) - {}",
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.kind,
        entry.status,
        entry.display_message(width)
    )
}
