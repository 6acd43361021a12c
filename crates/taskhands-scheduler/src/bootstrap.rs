//! Startup hook: start every auto-start task once the host is ready.

use std::sync::Arc;

use taskhands_core::{JobRegistry, SchedulerResult};
use tracing::{info, warn};

use crate::engine::{InitReport, SchedulerCore};

/// Starts the registry's auto-start subset on a [`SchedulerCore`].
pub struct Bootstrapper {
    registry: Arc<dyn JobRegistry>,
    core: Arc<SchedulerCore>,
}

impl Bootstrapper {
    pub fn new(registry: Arc<dyn JobRegistry>, core: Arc<SchedulerCore>) -> Self {
        Self { registry, core }
    }

    /// Start all auto-start tasks in catalog order. Individual failures are
    /// logged and reported; only a registry read failure is an error.
    pub async fn run(&self) -> SchedulerResult<InitReport> {
        let descriptors = self.registry.auto_start_descriptors().await?;
        if descriptors.is_empty() {
            info!("No auto-start tasks configured");
            return Ok(InitReport::default());
        }

        let report = self.core.init_all(&descriptors).await;
        for outcome in report.failed() {
            warn!(
                task = %outcome.key,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Auto-start failed"
            );
        }
        info!(
            started = report.started(),
            failed = report.outcomes.len() - report.started(),
            "Auto-start complete"
        );

        Ok(report)
    }
}
