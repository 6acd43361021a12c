//! # TaskHands Core
//!
//! Shared vocabulary of the TaskHands scheduling engine.
//!
//! ## Components
//!
//! - [`TaskDescriptor`] - Declarative template for one schedulable task
//! - [`Job`] - The executable capability bound to a task key
//! - [`JobRegistry`] - Lookup surface resolving keys to jobs and descriptors
//! - [`DescriptorStore`] - Persistence seam for descriptors (memory or files)
//!
//! The scheduling engine itself lives in `taskhands-scheduler`; this crate
//! carries no timers and no worker pool.

pub mod descriptor;
pub mod error;
pub mod job;
pub mod registry;
pub mod store;

pub use descriptor::{JobParams, TaskDescriptor, TaskStats, TaskView, sort_descriptors};
pub use error::{JobError, SchedulerError, SchedulerResult};
pub use job::{FiringKind, FnJob, Job, JobContext, job_fn};
pub use registry::{JobRegistry, StoreJobRegistry};
pub use store::{DescriptorStore, FileDescriptorStore, MemoryDescriptorStore};
