//! Job registry: resolves task keys to jobs and descriptors.
//!
//! The registry is a pure lookup surface for the scheduler. How it is
//! populated (config file, explicit calls, a database) is up to the host.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::descriptor::{TaskDescriptor, sort_descriptors};
use crate::error::{SchedulerError, SchedulerResult};
use crate::job::Job;
use crate::store::{DescriptorStore, MemoryDescriptorStore};

/// Lookup contract consumed by the scheduler.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Resolve the job bound to `key`.
    async fn resolve(&self, key: &str) -> SchedulerResult<Arc<dyn Job>>;

    /// Current descriptor for `key`.
    async fn descriptor(&self, key: &str) -> SchedulerResult<TaskDescriptor>;

    /// Full catalog ordered by `sort_order`, then `key`.
    async fn all_descriptors(&self) -> SchedulerResult<Vec<TaskDescriptor>>;

    /// Replace the descriptor of a known task. Live schedules are untouched
    /// until the task is restarted.
    async fn update_descriptor(&self, descriptor: TaskDescriptor) -> SchedulerResult<()>;

    /// Auto-start subset of [`JobRegistry::all_descriptors`], same order.
    async fn auto_start_descriptors(&self) -> SchedulerResult<Vec<TaskDescriptor>> {
        Ok(self
            .all_descriptors()
            .await?
            .into_iter()
            .filter(|d| d.auto_start)
            .collect())
    }
}

/// Registry with explicitly registered jobs and descriptors kept in a
/// [`DescriptorStore`].
pub struct StoreJobRegistry {
    jobs: DashMap<String, Arc<dyn Job>>,
    store: Arc<dyn DescriptorStore>,
}

impl StoreJobRegistry {
    /// Create a registry over an existing descriptor store.
    pub fn new(store: Arc<dyn DescriptorStore>) -> Self {
        Self {
            jobs: DashMap::new(),
            store,
        }
    }

    /// Create a registry backed by an empty in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDescriptorStore::new()))
    }

    /// Bind a job to a key, replacing any previous binding.
    pub fn register(&self, key: impl Into<String>, job: Arc<dyn Job>) -> SchedulerResult<()> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(SchedulerError::InvalidDescriptor(
                "task key must not be empty".to_string(),
            ));
        }
        debug!(task = %key, "Job registered");
        self.jobs.insert(key, job);
        Ok(())
    }

    /// Bind a job and store its descriptor in one call.
    pub async fn register_task(
        &self,
        descriptor: TaskDescriptor,
        job: Arc<dyn Job>,
    ) -> SchedulerResult<()> {
        descriptor.validate()?;
        self.store.save(&descriptor).await?;
        self.register(descriptor.key.clone(), job)
    }

    /// Remove a job binding. Returns whether one existed.
    pub fn unregister(&self, key: &str) -> bool {
        self.jobs.remove(key).is_some()
    }

    /// Whether a job is bound to `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.jobs.contains_key(key)
    }

    /// Keys with a bound job.
    pub fn job_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// The underlying descriptor store.
    pub fn store(&self) -> Arc<dyn DescriptorStore> {
        self.store.clone()
    }
}

#[async_trait]
impl JobRegistry for StoreJobRegistry {
    async fn resolve(&self, key: &str) -> SchedulerResult<Arc<dyn Job>> {
        self.jobs
            .get(key)
            .map(|job| job.value().clone())
            .ok_or_else(|| SchedulerError::UnknownTask(key.to_string()))
    }

    async fn descriptor(&self, key: &str) -> SchedulerResult<TaskDescriptor> {
        self.store
            .load(key)
            .await?
            .ok_or_else(|| SchedulerError::UnknownTask(key.to_string()))
    }

    async fn all_descriptors(&self) -> SchedulerResult<Vec<TaskDescriptor>> {
        let mut descriptors = self.store.load_all().await?;
        sort_descriptors(&mut descriptors);
        Ok(descriptors)
    }

    async fn update_descriptor(&self, descriptor: TaskDescriptor) -> SchedulerResult<()> {
        descriptor.validate()?;
        if self.store.load(&descriptor.key).await?.is_none() {
            return Err(SchedulerError::UnknownTask(descriptor.key));
        }
        self.store.save(&descriptor).await?;
        debug!(task = %descriptor.key, cron = %descriptor.cron, "Descriptor updated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
