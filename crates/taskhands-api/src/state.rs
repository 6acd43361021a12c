//! Application state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use taskhands_scheduler::SchedulerCore;

/// Application state shared across handlers.
pub struct AppState {
    pub scheduler: Arc<SchedulerCore>,
    start_time: Instant,
}

impl AppState {
    pub fn new(scheduler: Arc<SchedulerCore>) -> Self {
        Self {
            scheduler,
            start_time: Instant::now(),
        }
    }

    /// Time since the state was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
