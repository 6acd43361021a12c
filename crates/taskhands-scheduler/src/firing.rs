//! Execution of a single firing: context, span, panic containment, stats.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use taskhands_core::{FiringKind, Job, JobContext, JobError, JobParams, TaskDescriptor, TaskStats};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span};
use uuid::Uuid;

/// Everything needed to run one task's job, cheap to clone per firing.
#[derive(Clone)]
pub(crate) struct Firing {
    job: Arc<dyn Job>,
    descriptor: Arc<TaskDescriptor>,
    stats: Arc<Mutex<TaskStats>>,
}

impl Firing {
    pub(crate) fn new(
        job: Arc<dyn Job>,
        descriptor: Arc<TaskDescriptor>,
        stats: Arc<Mutex<TaskStats>>,
    ) -> Self {
        Self {
            job,
            descriptor,
            stats,
        }
    }

    pub(crate) fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    /// Run the job once. Failures are logged and recorded here and never
    /// propagate to the caller's task.
    pub(crate) async fn execute(
        self,
        kind: FiringKind,
        params: JobParams,
        abandon: CancellationToken,
    ) -> Result<(), JobError> {
        let key = self.descriptor.key.clone();
        let firing_id = Uuid::new_v4().to_string();
        let ctx = JobContext::from_descriptor(&self.descriptor, params, kind, firing_id.clone());

        {
            let mut stats = self.stats.lock();
            stats.fired += 1;
            stats.last_fired_at = Some(ctx.fired_at);
        }

        let span = info_span!("task_firing", task = %key, trigger = %kind, firing_id = %firing_id);
        let job = self.job.clone();

        let result = async move {
            debug!("Firing started");
            tokio::select! {
                biased;
                _ = abandon.cancelled() => Err(JobError::Abandoned),
                outcome = AssertUnwindSafe(job.run(ctx)).catch_unwind() => match outcome {
                    Ok(result) => result,
                    Err(panic) => Err(JobError::Panicked(panic_message(panic.as_ref()))),
                },
            }
        }
        .instrument(span.clone())
        .await;

        let finished_at = Utc::now();
        {
            let mut stats = self.stats.lock();
            stats.last_finished_at = Some(finished_at);
            match &result {
                Ok(()) => {
                    stats.succeeded += 1;
                    stats.last_error = None;
                }
                Err(e) => {
                    stats.failed += 1;
                    stats.last_error = Some(e.to_string());
                }
            }
        }

        span.in_scope(|| match &result {
            Ok(()) => debug!("Firing finished"),
            Err(e) => error!(
                task = %key,
                trigger = %kind,
                at = %finished_at.to_rfc3339(),
                error = %e,
                "Job execution failed"
            ),
        });

        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
