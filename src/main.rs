//! TaskHands - dynamic cron task scheduler
//!
//! Main entry point for the TaskHands CLI and control server.

mod cli;
mod jobs;
mod register;
mod signal;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use taskhands_api::{ApiConfig, ApiServer, AppState};
use taskhands_config::{
    Config, ConfigError, ConfigLoader, ConfigValidator, LoggingConfig, SchedulerSettings,
};
use taskhands_scheduler::{
    Bootstrapper, CronTrigger, ScheduleTimezone, SchedulerConfig, SchedulerCore,
};

use crate::cli::{Cli, Commands};
use crate::jobs::builtin_job;
use crate::register::{build_registry, open_store};

/// Get the ~/.taskhands directory path.
fn taskhands_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".taskhands"))
        .unwrap_or_else(|| PathBuf::from(".taskhands"))
}

/// Explicit path, else `config/default.toml`, else `~/.taskhands/config.toml`.
fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    [
        PathBuf::from("config/default.toml"),
        taskhands_dir().join("config.toml"),
    ]
    .into_iter()
    .find(|p| p.exists())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let (config, validation) = ConfigLoader::load_validated(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            for warning in &validation.warnings {
                eprintln!("config warning: {}: {}", warning.path, warning.message);
            }
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Initialize tracing with console and optional file output.
///
/// The filter comes from `RUST_LOG` when set, else `logging.level`. Log files
/// rotate daily under `logging.dir`.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match logging.resolved_dir() {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("taskhands")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)
                .context("Failed to create log file appender")?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // Flushes on drop; must live as long as the process
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let json_layer = logging.json.then(|| fmt::layer().json().with_target(true));
    let text_layer = (!logging.json).then(|| fmt::layer().with_target(true).with_ansi(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}

fn scheduler_config(settings: &SchedulerSettings) -> Result<SchedulerConfig> {
    let timezone = settings.timezone.parse::<ScheduleTimezone>().map_err(|message| {
        ConfigError::InvalidValue {
            field: "scheduler.timezone".to_string(),
            message,
        }
    })?;
    Ok(SchedulerConfig::default()
        .with_max_workers(settings.max_workers)
        .with_shutdown_grace_secs(settings.shutdown_grace_secs)
        .with_timezone(timezone))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Some(Commands::Check) => check_config(config_path.as_deref()),
        Some(Commands::Run { host, port }) => {
            let config = load_config(config_path.as_deref())?;
            init_tracing(&config.logging)?;
            run_server(config, config_path, host, port).await
        }
        None => {
            let config = load_config(config_path.as_deref())?;
            init_tracing(&config.logging)?;
            run_server(config, config_path, None, None).await
        }
    }
}

/// Run the scheduler and control server in foreground.
async fn run_server(
    config: Config,
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    info!("Starting TaskHands v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => warn!("No config file found, running with defaults"),
    }

    let scheduler_config = scheduler_config(&config.scheduler)?;
    let store = open_store(&config).await?;
    let registry = build_registry(&config, store).await?;
    let scheduler = Arc::new(SchedulerCore::new(registry.clone(), &scheduler_config));
    info!(
        max_workers = scheduler.pool().max_workers(),
        timezone = %scheduler.timezone(),
        "Scheduler initialized"
    );

    Bootstrapper::new(registry, scheduler.clone())
        .run()
        .await
        .context("Auto-start failed")?;

    let api_config = ApiConfig::new(
        host.unwrap_or(config.server.host),
        port.unwrap_or(config.server.port),
    );
    let server = ApiServer::new(api_config, Arc::new(AppState::new(scheduler.clone())));

    // Server first, then drain the scheduler
    let served = server.run(signal::shutdown_signal()).await;
    let report = scheduler.shutdown().await;
    if report.drained {
        info!(tasks_stopped = report.tasks_stopped, "Shutdown complete");
    } else {
        warn!(
            tasks_stopped = report.tasks_stopped,
            "Shutdown grace period elapsed, in-flight jobs abandoned"
        );
    }

    served.with_context(|| format!("Control server on {} failed", server.addr()))
}

/// Validate the configuration and print the task table.
fn check_config(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        println!("No config file found; defaults are valid.");
        return Ok(());
    };

    let config = ConfigLoader::load(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    let validation = ConfigValidator::validate(&config)?;
    let timezone = config
        .scheduler
        .timezone
        .parse::<ScheduleTimezone>()
        .unwrap_or_default();

    println!("Config: {}", path.display());
    for error in &validation.errors {
        println!("  error   {}: {}", error.path, error.message);
    }
    for warning in &validation.warnings {
        println!("  warning {}: {}", warning.path, warning.message);
    }

    if !config.tasks.is_empty() {
        println!();
        println!("{:<24} {:<8} {:<22} {:<6} NEXT", "TASK", "JOB", "CRON", "AUTO");
    }
    let mut broken = 0;
    for (key, entry) in &config.tasks {
        let kind = entry.job_kind(key);
        let next = match (builtin_job(kind), CronTrigger::parse(&entry.cron, timezone)) {
            (None, _) => {
                broken += 1;
                "unknown job kind".to_string()
            }
            (Some(_), Ok(trigger)) => trigger
                .next_after(chrono::Utc::now())
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            (Some(_), Err(e)) => {
                broken += 1;
                format!("invalid: {}", e)
            }
        };
        println!(
            "{:<24} {:<8} {:<22} {:<6} {}",
            key, kind, entry.cron, entry.auto_start, next
        );
    }

    if validation.is_valid() && broken == 0 {
        println!();
        println!("OK: {} tasks", config.tasks.len());
        Ok(())
    } else {
        Err(anyhow!(
            "{} config errors, {} unusable tasks",
            validation.errors.len(),
            broken
        ))
    }
}
