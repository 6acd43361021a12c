//! The scheduling engine.
//!
//! `SchedulerCore` owns the live handle table and the worker pool. It is the
//! only component that registers or cancels triggers; every operation may be
//! called concurrently from any task.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use taskhands_core::{
    FiringKind, Job, JobParams, JobRegistry, SchedulerError, SchedulerResult, TaskDescriptor,
    TaskStats, TaskView,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::firing::Firing;
use crate::handle::{LiveHandle, TaskSlot, TaskState};
use crate::pool::WorkerPool;
use crate::trigger::{CronTrigger, ScheduleTimezone, TriggerRegistration};

/// Result of starting one key during [`SchedulerCore::init_all`].
#[derive(Debug, Clone, Serialize)]
pub struct InitOutcome {
    pub key: String,
    pub error: Option<String>,
}

impl InitOutcome {
    pub fn is_started(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-key outcomes of a bulk start, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitReport {
    pub outcomes: Vec<InitOutcome>,
}

impl InitReport {
    /// Number of keys started.
    pub fn started(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_started()).count()
    }

    /// Outcomes that failed.
    pub fn failed(&self) -> Vec<&InitOutcome> {
        self.outcomes.iter().filter(|o| !o.is_started()).collect()
    }
}

/// Summary of [`SchedulerCore::shutdown`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ShutdownReport {
    /// Tasks that were running when shutdown began.
    pub tasks_stopped: usize,
    /// Whether all in-flight work finished within the grace period.
    pub drained: bool,
}

/// Job, descriptor and parsed trigger resolved for a start.
struct Prepared {
    job: Arc<dyn Job>,
    descriptor: Arc<TaskDescriptor>,
    trigger: CronTrigger,
}

/// Scheduling engine.
pub struct SchedulerCore {
    registry: Arc<dyn JobRegistry>,
    pool: Arc<WorkerPool>,
    slots: DashMap<String, Arc<TaskSlot>>,
    stats: DashMap<String, Arc<Mutex<TaskStats>>>,
    timezone: ScheduleTimezone,
    shutdown_grace: Duration,
    shutdown: CancellationToken,
}

impl SchedulerCore {
    /// Create an engine over `registry` with its own worker pool.
    pub fn new(registry: Arc<dyn JobRegistry>, config: &SchedulerConfig) -> Self {
        Self {
            registry,
            pool: Arc::new(WorkerPool::new(&config.workers)),
            slots: DashMap::new(),
            stats: DashMap::new(),
            timezone: config.timezone,
            shutdown_grace: config.shutdown_grace(),
            shutdown: CancellationToken::new(),
        }
    }

    /// The registry this engine resolves keys against.
    pub fn registry(&self) -> Arc<dyn JobRegistry> {
        self.registry.clone()
    }

    /// The shared worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Time zone cron expressions are evaluated in.
    pub fn timezone(&self) -> ScheduleTimezone {
        self.timezone
    }

    /// Whether [`SchedulerCore::shutdown`] has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Start every descriptor in order. A failing key is recorded and the
    /// loop moves on.
    pub async fn init_all(&self, descriptors: &[TaskDescriptor]) -> InitReport {
        let mut report = InitReport {
            outcomes: Vec::with_capacity(descriptors.len()),
        };

        for descriptor in descriptors {
            let error = match self.start(&descriptor.key).await {
                Ok(_) => None,
                Err(e) => {
                    warn!(task = %descriptor.key, error = %e, "Task failed to start");
                    Some(e.to_string())
                }
            };
            report.outcomes.push(InitOutcome {
                key: descriptor.key.clone(),
                error,
            });
        }

        report
    }

    /// Register the recurring schedule for `key`. Starting a running task is
    /// a no-op.
    pub async fn start(&self, key: &str) -> SchedulerResult<bool> {
        self.ensure_accepting()?;

        let (slot, prepared) = match self.slot(key) {
            Some(slot) => (slot, None),
            None => {
                // Insert only once the key resolves so failures leave the
                // table untouched.
                let prepared = self.prepare(key).await?;
                let slot = self
                    .slots
                    .entry(key.to_string())
                    .or_insert_with(|| {
                        Arc::new(TaskSlot::new(
                            key,
                            prepared.job.clone(),
                            prepared.descriptor.clone(),
                            self.stats_for(key),
                        ))
                    })
                    .clone();
                (slot, Some(prepared))
            }
        };

        let mut handle = slot.handle.lock().await;
        self.ensure_accepting()?;

        if handle.state() == TaskState::Running {
            debug!(task = %key, "Task already running");
            return Ok(true);
        }

        let prepared = match prepared {
            Some(prepared) => prepared,
            None => self.prepare(key).await?,
        };
        self.arm(&slot, &mut handle, prepared).await?;
        Ok(true)
    }

    /// Cancel the schedule for `key` and wait for an in-flight firing to
    /// finish. Stopping an unknown or stopped key is a no-op.
    pub async fn stop(&self, key: &str) -> SchedulerResult<bool> {
        let Some(slot) = self.slot(key) else {
            debug!(task = %key, "Stop requested for task that was never started");
            return Ok(true);
        };

        let mut handle = slot.handle.lock().await;
        self.deactivate(&slot, &mut handle).await;
        Ok(true)
    }

    /// Re-register `key` with a freshly read descriptor.
    ///
    /// The task reports running throughout; it only turns stopped if the
    /// new descriptor cannot be started.
    pub async fn restart(&self, key: &str) -> SchedulerResult<bool> {
        self.ensure_accepting()?;

        let Some(slot) = self.slot(key) else {
            return self.start(key).await;
        };

        let mut handle = slot.handle.lock().await;
        self.halt(&slot, &mut handle).await;

        let prepared = match self.prepare(key).await {
            Ok(prepared) => prepared,
            Err(e) => {
                slot.set_running(false);
                warn!(task = %key, error = %e, "Restart failed, task left stopped");
                return Err(e);
            }
        };
        self.arm(&slot, &mut handle, prepared).await?;
        debug!(task = %key, "Task restarted");
        Ok(true)
    }

    /// Run the job for `key` once, outside its schedule, and wait for it.
    ///
    /// Returns whether the job succeeded. `params` replaces the descriptor's
    /// parameters for this run only.
    pub async fn try_once(&self, key: &str, params: Option<JobParams>) -> SchedulerResult<bool> {
        self.ensure_accepting()?;

        let job = self.registry.resolve(key).await?;
        let descriptor = self.registry.descriptor(key).await?;
        let params = params.unwrap_or_else(|| descriptor.params.clone());
        let firing = Firing::new(job, Arc::new(descriptor), self.stats_for(key));

        let (tx, rx) = oneshot::channel();
        let abandon = self.pool.abandon_token();
        self.pool
            .submit(format!("{}:manual", key), async move {
                let result = firing.execute(FiringKind::Manual, params, abandon).await;
                let _ = tx.send(result.is_ok());
            })
            .map_err(|_| SchedulerError::ShuttingDown)?;

        info!(task = %key, "Manual run submitted");
        Ok(rx.await.unwrap_or(false))
    }

    /// Whether `key` has a registered schedule.
    pub fn is_running(&self, key: &str) -> bool {
        self.slot(key).is_some_and(|slot| slot.is_running())
    }

    /// Lifecycle state of `key`; `None` if it was never started.
    pub fn state(&self, key: &str) -> Option<TaskState> {
        self.slot(key).map(|slot| {
            if slot.is_running() {
                TaskState::Running
            } else {
                TaskState::Stopped
            }
        })
    }

    /// Keys present in the live handle table, sorted.
    pub fn live_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of running tasks.
    pub fn running_count(&self) -> usize {
        self.slots.iter().filter(|e| e.value().is_running()).count()
    }

    /// Execution counters for `key`, if it has fired or been started.
    pub fn stats(&self, key: &str) -> Option<TaskStats> {
        self.stats.get(key).map(|s| s.lock().clone())
    }

    /// Registry catalog merged with running state and stats.
    pub async fn list_tasks(&self) -> SchedulerResult<Vec<TaskView>> {
        let descriptors = self.registry.all_descriptors().await?;
        Ok(descriptors.into_iter().map(|d| self.view(d)).collect())
    }

    /// Single task view.
    pub async fn task(&self, key: &str) -> SchedulerResult<TaskView> {
        let descriptor = self.registry.descriptor(key).await?;
        Ok(self.view(descriptor))
    }

    /// Check that `descriptor.cron` would start, without registering
    /// anything.
    pub fn check_schedule(&self, descriptor: &TaskDescriptor) -> SchedulerResult<()> {
        self.parse_trigger(descriptor).map(|_| ())
    }

    /// Replace the stored descriptor for a known key. The live schedule
    /// keeps its snapshot until [`SchedulerCore::restart`].
    pub async fn update_descriptor(&self, descriptor: TaskDescriptor) -> SchedulerResult<()> {
        let key = descriptor.key.clone();
        self.registry.update_descriptor(descriptor).await?;
        if self.is_running(&key) {
            info!(task = %key, "Descriptor updated, restart to apply");
        }
        Ok(())
    }

    /// Stop all schedules and drain the worker pool for at most the
    /// configured grace period. Later starts fail with
    /// [`SchedulerError::ShuttingDown`].
    pub async fn shutdown(&self) -> ShutdownReport {
        let first = !self.shutdown.is_cancelled();
        self.shutdown.cancel();
        if first {
            info!(running = self.running_count(), "Scheduler shutting down");
        }

        let slots: Vec<Arc<TaskSlot>> = self.slots.iter().map(|e| e.value().clone()).collect();
        let mut tasks_stopped = 0;
        for slot in slots {
            if slot.set_running(false) {
                tasks_stopped += 1;
            }
            // A busy slot is held by a lifecycle call. Its registration
            // is a child of the shutdown token, and the holder checks the
            // token again before releasing the slot. Waiting here would hold
            // shutdown behind a stop awaiting a long firing.
            if let Ok(mut handle) = slot.handle.try_lock() {
                if let Some(registration) = handle.registration.take() {
                    registration.cancel().await;
                }
            }
        }

        let drained = self.pool.shutdown(self.shutdown_grace).await;
        ShutdownReport {
            tasks_stopped,
            drained,
        }
    }

    fn ensure_accepting(&self) -> SchedulerResult<()> {
        if self.shutdown.is_cancelled() {
            Err(SchedulerError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn slot(&self, key: &str) -> Option<Arc<TaskSlot>> {
        self.slots.get(key).map(|e| e.value().clone())
    }

    fn stats_for(&self, key: &str) -> Arc<Mutex<TaskStats>> {
        self.stats.entry(key.to_string()).or_default().clone()
    }

    fn view(&self, descriptor: TaskDescriptor) -> TaskView {
        let running = self.is_running(&descriptor.key);
        let stats = self.stats(&descriptor.key).unwrap_or_default();
        TaskView {
            descriptor,
            running,
            stats,
        }
    }

    fn parse_trigger(&self, descriptor: &TaskDescriptor) -> SchedulerResult<CronTrigger> {
        CronTrigger::parse(&descriptor.cron, self.timezone).map_err(|e| {
            SchedulerError::InvalidSchedule {
                key: descriptor.key.clone(),
                cron: descriptor.cron.clone(),
                reason: e.to_string(),
            }
        })
    }

    async fn prepare(&self, key: &str) -> SchedulerResult<Prepared> {
        let job = self.registry.resolve(key).await?;
        let descriptor = self.registry.descriptor(key).await?;
        let trigger = self.parse_trigger(&descriptor)?;

        Ok(Prepared {
            job,
            descriptor: Arc::new(descriptor),
            trigger,
        })
    }

    fn activate(&self, slot: &TaskSlot, handle: &mut LiveHandle, prepared: Prepared) {
        let Prepared {
            job,
            descriptor,
            trigger,
        } = prepared;
        handle.job = job;
        handle.descriptor = descriptor;

        let key = handle.key.clone();
        let firing = Firing::new(
            handle.job.clone(),
            handle.descriptor.clone(),
            slot.stats.clone(),
        );
        let params = handle.descriptor.params.clone();
        let pool = self.pool.clone();
        let in_flight = slot.in_flight.clone();
        let stats = slot.stats.clone();
        let timer_key = key.clone();

        let registration =
            TriggerRegistration::spawn(key.clone(), trigger, &self.shutdown, move |scheduled| {
                let guard = match in_flight.clone().try_lock_owned() {
                    Ok(guard) => guard,
                    Err(_) => {
                        stats.lock().skipped += 1;
                        debug!(
                            task = %timer_key,
                            scheduled = %scheduled.to_rfc3339(),
                            "Previous firing still in flight, skipping"
                        );
                        return;
                    }
                };

                let firing = firing.clone();
                let params = params.clone();
                let abandon = pool.abandon_token();
                let submitted = pool.submit(timer_key.clone(), async move {
                    let _guard = guard;
                    let _ = firing.execute(FiringKind::Scheduled, params, abandon).await;
                });
                if submitted.is_err() {
                    debug!(task = %timer_key, "Worker pool closed, firing dropped");
                }
            });

        info!(
            task = %key,
            cron = %registration.expression(),
            timezone = %self.timezone,
            "Task started"
        );
        handle.registration = Some(registration);
        slot.set_running(true);
    }

    /// Activate `prepared` unless shutdown began meanwhile. The token is
    /// checked again after activation since shutdown may have scanned the
    /// slot before the running flag was set.
    async fn arm(
        &self,
        slot: &TaskSlot,
        handle: &mut LiveHandle,
        prepared: Prepared,
    ) -> SchedulerResult<()> {
        if let Err(e) = self.ensure_accepting() {
            slot.set_running(false);
            return Err(e);
        }

        self.activate(slot, handle, prepared);
        if self.shutdown.is_cancelled() {
            self.deactivate(slot, handle).await;
            return Err(SchedulerError::ShuttingDown);
        }
        Ok(())
    }

    /// Cancel the registration and wait for an in-flight firing, leaving the
    /// running flag alone. Returns whether a registration was live.
    async fn halt(&self, slot: &TaskSlot, handle: &mut LiveHandle) -> bool {
        let Some(registration) = handle.registration.take() else {
            return false;
        };

        registration.cancel().await;
        let _in_flight = slot.in_flight.lock().await;
        true
    }

    async fn deactivate(&self, slot: &TaskSlot, handle: &mut LiveHandle) {
        if !self.halt(slot, handle).await {
            debug!(task = %handle.key, "Task already stopped");
            return;
        }

        slot.set_running(false);
        info!(task = %handle.key, cron = %handle.descriptor.cron, "Task stopped");
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
