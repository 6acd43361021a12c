//! Per-key scheduling state held by the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use taskhands_core::{Job, TaskDescriptor, TaskStats};

use crate::trigger::TriggerRegistration;

/// Lifecycle state of a key that has been started at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Stopped,
}

/// Live binding of a key to a job, a descriptor snapshot and, while running,
/// a trigger registration.
pub(crate) struct LiveHandle {
    pub(crate) key: String,
    pub(crate) job: Arc<dyn Job>,
    pub(crate) descriptor: Arc<TaskDescriptor>,
    pub(crate) registration: Option<TriggerRegistration>,
}

impl LiveHandle {
    pub(crate) fn state(&self) -> TaskState {
        if self.registration.is_some() {
            TaskState::Running
        } else {
            TaskState::Stopped
        }
    }
}

/// Table entry for one key.
///
/// `handle` serializes start/stop/restart for this key only. `in_flight` is
/// held by the scheduled firing currently queued or executing.
pub(crate) struct TaskSlot {
    pub(crate) handle: tokio::sync::Mutex<LiveHandle>,
    pub(crate) in_flight: Arc<tokio::sync::Mutex<()>>,
    pub(crate) stats: Arc<Mutex<TaskStats>>,
    running: AtomicBool,
}

impl TaskSlot {
    pub(crate) fn new(
        key: &str,
        job: Arc<dyn Job>,
        descriptor: Arc<TaskDescriptor>,
        stats: Arc<Mutex<TaskStats>>,
    ) -> Self {
        Self {
            handle: tokio::sync::Mutex::new(LiveHandle {
                key: key.to_string(),
                job,
                descriptor,
                registration: None,
            }),
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
            stats,
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }
}
