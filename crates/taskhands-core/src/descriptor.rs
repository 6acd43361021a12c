//! Task descriptor and observability views.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

/// Opaque parameter bag handed to a job at every invocation.
pub type JobParams = serde_json::Map<String, serde_json::Value>;

/// Declarative template for one schedulable task.
///
/// A descriptor never carries live state. Whether a task is running belongs
/// to the scheduler; see [`TaskView`] for the merged picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unique task key.
    pub key: String,
    /// Cron expression, seconds first (`sec min hour dom mon dow [year]`).
    pub cron: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Parameters passed to every firing.
    #[serde(default)]
    pub params: JobParams,
    /// Whether the bootstrapper starts this task at process start.
    #[serde(default)]
    pub auto_start: bool,
    /// Auto-start ordering; lower values start first.
    #[serde(default)]
    pub sort_order: i32,
}

impl TaskDescriptor {
    /// Create a new descriptor with empty params, not auto-started.
    pub fn new(key: impl Into<String>, cron: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cron: cron.into(),
            description: String::new(),
            params: JobParams::new(),
            auto_start: false,
            sort_order: 0,
        }
    }

    /// Add a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace the parameter bag.
    pub fn with_params(mut self, params: JobParams) -> Self {
        self.params = params;
        self
    }

    /// Set a single parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Set the auto-start flag.
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Set the sort order.
    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Replace the cron expression.
    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = cron.into();
        self
    }

    /// Structural validation. Cron syntax is checked at schedule time.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.key.trim().is_empty() {
            return Err(SchedulerError::InvalidDescriptor(
                "task key must not be empty".to_string(),
            ));
        }
        if self.key != self.key.trim() {
            return Err(SchedulerError::InvalidDescriptor(format!(
                "task key '{}' has surrounding whitespace",
                self.key
            )));
        }
        Ok(())
    }

    /// Ordering used for catalogs and auto-start: `sort_order`, then `key`.
    pub fn catalog_order(&self, other: &Self) -> Ordering {
        self.sort_order
            .cmp(&other.sort_order)
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// Sort descriptors into catalog order.
pub fn sort_descriptors(descriptors: &mut [TaskDescriptor]) {
    descriptors.sort_by(|a, b| a.catalog_order(b));
}

/// Execution counters for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Firings that reached the job body (scheduled and manual).
    pub fired: u64,
    /// Firings that completed successfully.
    pub succeeded: u64,
    /// Firings that failed, panicked or were abandoned.
    pub failed: u64,
    /// Scheduled firings dropped because the previous one was still in flight.
    pub skipped: u64,
    /// Start time of the most recent firing.
    pub last_fired_at: Option<DateTime<Utc>>,
    /// End time of the most recent firing.
    pub last_finished_at: Option<DateTime<Utc>>,
    /// Error of the most recent failed firing.
    pub last_error: Option<String>,
}

/// Descriptor merged with live scheduler state, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub descriptor: TaskDescriptor,
    /// Whether a recurring schedule is currently registered.
    pub running: bool,
    /// Execution counters.
    #[serde(default)]
    pub stats: TaskStats,
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
