//! Error types shared by the registry and the scheduling engine.

use thiserror::Error;

/// Errors returned synchronously by registry and scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No job or descriptor is bound to the key.
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// The cron expression does not parse or never fires.
    #[error("Invalid schedule for task '{key}' ({cron}): {reason}")]
    InvalidSchedule {
        key: String,
        cron: String,
        reason: String,
    },

    /// Descriptor failed validation (empty key and the like).
    #[error("Invalid task descriptor: {0}")]
    InvalidDescriptor(String),

    /// The engine is draining and accepts no new schedules.
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    /// Descriptor store failure.
    #[error("Descriptor store error: {0}")]
    Store(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Short machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::UnknownTask(_) => "unknown_task",
            SchedulerError::InvalidSchedule { .. } => "invalid_schedule",
            SchedulerError::InvalidDescriptor(_) => "invalid_descriptor",
            SchedulerError::ShuttingDown => "shutting_down",
            SchedulerError::Store(_) => "store_error",
            SchedulerError::Internal(_) => "internal_error",
        }
    }
}

/// Result type for registry and scheduling operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Failure of a single job execution.
///
/// These never cross a scheduling boundary: the engine logs them and records
/// them in the task's stats.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The job body reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The job body panicked.
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The job was still running when the shutdown grace period elapsed.
    #[error("Job abandoned during shutdown")]
    Abandoned,
}

impl JobError {
    /// Convenience constructor for job implementations.
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Failed(err.to_string())
    }
}
