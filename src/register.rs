//! Registry construction from configuration.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use taskhands_config::{Config, TaskEntry};
use taskhands_core::{
    DescriptorStore, FileDescriptorStore, MemoryDescriptorStore, StoreJobRegistry, TaskDescriptor,
};

use crate::jobs::{BUILTIN_KINDS, builtin_job};

/// Descriptor for a `[tasks.<key>]` entry.
pub(crate) fn descriptor_from_entry(key: &str, entry: &TaskEntry) -> TaskDescriptor {
    TaskDescriptor::new(key, entry.cron.trim())
        .with_description(entry.description.clone())
        .with_params(entry.params.clone())
        .with_auto_start(entry.auto_start)
        .with_sort_order(entry.sort_order)
}

/// Open the configured descriptor store.
pub(crate) async fn open_store(config: &Config) -> Result<Arc<dyn DescriptorStore>> {
    match config.store.resolved_dir() {
        Some(dir) => {
            let store = FileDescriptorStore::new(dir.clone())
                .await
                .with_context(|| format!("Failed to open descriptor store at {}", dir.display()))?;
            info!("Descriptor store: {}", dir.display());
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryDescriptorStore::new())),
    }
}

/// Build the job registry for every configured task.
///
/// Descriptors already present in a persistent store win over the config
/// file, so updates made over HTTP survive a restart. Jobs are always bound
/// from the config.
pub(crate) async fn build_registry(
    config: &Config,
    store: Arc<dyn DescriptorStore>,
) -> Result<Arc<StoreJobRegistry>> {
    let registry = Arc::new(StoreJobRegistry::new(store.clone()));

    for (key, entry) in &config.tasks {
        let kind = entry.job_kind(key);
        let Some(job) = builtin_job(kind) else {
            bail!(
                "task '{}': unknown job kind '{}' (available: {})",
                key,
                kind,
                BUILTIN_KINDS.join(", ")
            );
        };

        if store.load(key).await?.is_some() {
            debug!(task = %key, "Keeping stored descriptor");
            registry.register(key.clone(), job)?;
        } else {
            registry
                .register_task(descriptor_from_entry(key, entry), job)
                .await
                .with_context(|| format!("Failed to register task '{}'", key))?;
        }
        debug!(task = %key, job = kind, "Task registered");
    }

    info!("Registered {} tasks", config.tasks.len());
    Ok(registry)
}

#[cfg(test)]
#[path = "register_tests.rs"]
mod tests;
