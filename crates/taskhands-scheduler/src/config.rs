//! Configuration for the scheduling engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::trigger::ScheduleTimezone;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker pool configuration.
    #[serde(default)]
    pub workers: WorkerPoolConfig,

    /// How long shutdown waits for in-flight firings before abandoning them.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Time zone cron expressions are evaluated in.
    #[serde(default)]
    pub timezone: ScheduleTimezone,
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: WorkerPoolConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            timezone: ScheduleTimezone::default(),
        }
    }
}

impl SchedulerConfig {
    /// Set the worker count.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.workers.max_workers = max_workers;
        self
    }

    /// Set the shutdown grace period in seconds.
    pub fn with_shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.shutdown_grace_secs = secs;
        self
    }

    /// Set the cron evaluation time zone.
    pub fn with_timezone(mut self, timezone: ScheduleTimezone) -> Self {
        self.timezone = timezone;
        self
    }

    /// Shutdown grace period as Duration.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum number of concurrently executing firings. Values below 1 are
    /// treated as 1.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_workers() -> usize {
    4
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}
