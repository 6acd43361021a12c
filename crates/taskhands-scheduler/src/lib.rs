//! # TaskHands Scheduler
//!
//! Cron scheduling engine with runtime control over individual tasks.
//!
//! ## Components
//!
//! - [`SchedulerCore`] - Live handle table and the start/stop/restart/try-once operations
//! - [`CronTrigger`] - Cron expression parsing and fire-time computation
//! - [`WorkerPool`] - Bounded pool every firing executes on
//! - [`Bootstrapper`] - Starts auto-start tasks once the host is ready
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskhands_core::{StoreJobRegistry, TaskDescriptor, job_fn};
//! use taskhands_scheduler::{SchedulerConfig, SchedulerCore};
//!
//! let registry = Arc::new(StoreJobRegistry::in_memory());
//! registry
//!     .register_task(
//!         TaskDescriptor::new("heartbeat", "*/10 * * * * *"),
//!         job_fn(|_ctx| async { Ok(()) }),
//!     )
//!     .await?;
//!
//! let core = SchedulerCore::new(registry, &SchedulerConfig::default());
//! core.start("heartbeat").await?;
//! ```

pub mod bootstrap;
pub mod config;
pub mod engine;
mod firing;
mod handle;
pub mod pool;
pub mod trigger;

pub use bootstrap::Bootstrapper;
pub use config::{SchedulerConfig, WorkerPoolConfig};
pub use engine::{InitOutcome, InitReport, SchedulerCore, ShutdownReport};
pub use handle::TaskState;
pub use pool::{PoolError, WorkerPool};
pub use trigger::{
    CronTrigger, ScheduleTimezone, TriggerClock, TriggerError, TriggerRegistration, schedules,
};
