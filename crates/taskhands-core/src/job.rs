//! The executable job capability.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::{JobParams, TaskDescriptor};
use crate::error::JobError;

/// What caused a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiringKind {
    /// A tick of the recurring cron schedule.
    Scheduled,
    /// An explicit try-once request.
    Manual,
}

impl std::fmt::Display for FiringKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FiringKind::Scheduled => write!(f, "scheduled"),
            FiringKind::Manual => write!(f, "manual"),
        }
    }
}

/// Everything a job sees for one firing.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub key: String,
    pub cron: String,
    pub description: String,
    pub params: JobParams,
    pub kind: FiringKind,
    /// Unique per firing; also recorded on the tracing span.
    pub firing_id: String,
    pub fired_at: DateTime<Utc>,
}

impl JobContext {
    /// Build a context from a descriptor snapshot.
    pub fn from_descriptor(
        descriptor: &TaskDescriptor,
        params: JobParams,
        kind: FiringKind,
        firing_id: impl Into<String>,
    ) -> Self {
        Self {
            key: descriptor.key.clone(),
            cron: descriptor.cron.clone(),
            description: descriptor.description.clone(),
            params,
            kind,
            firing_id: firing_id.into(),
            fired_at: Utc::now(),
        }
    }

    /// Look up a string parameter.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_str())
    }
}

/// A unit of work bound to a task key.
///
/// Implementations must tolerate being invoked concurrently when manual
/// try-once runs overlap a scheduled firing; scheduled firings of the same
/// key never overlap each other.
#[async_trait]
pub trait Job: Send + Sync {
    /// Run the job once.
    async fn run(&self, ctx: JobContext) -> Result<(), JobError>;
}

/// Job backed by an async closure.
pub struct FnJob<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}

/// Wrap an async closure as a shareable job.
pub fn job_fn<F, Fut>(f: F) -> Arc<dyn Job>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(FnJob { f })
}
