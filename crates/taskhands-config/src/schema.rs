//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::ConfigLoader;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Task catalog keyed by task key.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskEntry>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Scheduling engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Size of the shared worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Seconds shutdown waits for in-flight jobs.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Timezone for cron expressions: "UTC" or "local".
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_max_workers() -> usize {
    4
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            timezone: default_timezone(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default)]
    pub dir: Option<String>,

    /// Emit JSON lines on the console instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Log directory with `~` expanded.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir
            .as_deref()
            .map(|dir| PathBuf::from(ConfigLoader::expand_path(dir)))
    }
}

/// Descriptor persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for JSON descriptor files. In-memory when unset.
    #[serde(default)]
    pub dir: Option<String>,
}

impl StoreConfig {
    /// Store directory with `~` expanded.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir
            .as_deref()
            .map(|dir| PathBuf::from(ConfigLoader::expand_path(dir)))
    }
}

/// One `[tasks.<key>]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Built-in job kind; defaults to the task key.
    #[serde(default)]
    pub job: Option<String>,

    /// Cron expression, seconds first.
    #[serde(default)]
    pub cron: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub auto_start: bool,

    #[serde(default)]
    pub sort_order: i32,

    /// Parameters handed to the job on every firing.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl TaskEntry {
    /// Job kind bound to this entry.
    pub fn job_kind<'a>(&'a self, key: &'a str) -> &'a str {
        self.job.as_deref().unwrap_or(key)
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
