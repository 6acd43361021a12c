//! Descriptor persistence.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::descriptor::TaskDescriptor;
use crate::error::{SchedulerError, SchedulerResult};

/// Storage for task descriptors, keyed by task key.
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Load a descriptor by key.
    async fn load(&self, key: &str) -> SchedulerResult<Option<TaskDescriptor>>;

    /// Load all descriptors, in no particular order.
    async fn load_all(&self) -> SchedulerResult<Vec<TaskDescriptor>>;

    /// Insert or replace a descriptor.
    async fn save(&self, descriptor: &TaskDescriptor) -> SchedulerResult<()>;

    /// Delete a descriptor. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> SchedulerResult<()>;
}

/// In-memory descriptor store.
pub struct MemoryDescriptorStore {
    descriptors: RwLock<HashMap<String, TaskDescriptor>>,
}

impl MemoryDescriptorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store seeded with descriptors. Later duplicates win.
    pub fn with_descriptors(descriptors: impl IntoIterator<Item = TaskDescriptor>) -> Self {
        let map = descriptors
            .into_iter()
            .map(|d| (d.key.clone(), d))
            .collect();
        Self {
            descriptors: RwLock::new(map),
        }
    }
}

impl Default for MemoryDescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DescriptorStore for MemoryDescriptorStore {
    async fn load(&self, key: &str) -> SchedulerResult<Option<TaskDescriptor>> {
        Ok(self.descriptors.read().await.get(key).cloned())
    }

    async fn load_all(&self) -> SchedulerResult<Vec<TaskDescriptor>> {
        Ok(self.descriptors.read().await.values().cloned().collect())
    }

    async fn save(&self, descriptor: &TaskDescriptor) -> SchedulerResult<()> {
        self.descriptors
            .write()
            .await
            .insert(descriptor.key.clone(), descriptor.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> SchedulerResult<()> {
        self.descriptors.write().await.remove(key);
        Ok(())
    }
}

/// File system store: one JSON document per task under `<root>/tasks/`.
pub struct FileDescriptorStore {
    storage_path: PathBuf,
}

impl FileDescriptorStore {
    /// Open (and create if needed) a store rooted at `storage_path`.
    pub async fn new(storage_path: impl Into<PathBuf>) -> SchedulerResult<Self> {
        let storage_path = storage_path.into();
        let tasks_dir = storage_path.join("tasks");

        fs::create_dir_all(&tasks_dir).await.map_err(|e| {
            SchedulerError::Store(format!("Failed to create tasks directory: {}", e))
        })?;

        debug!("FileDescriptorStore initialized at {:?}", storage_path);

        Ok(Self { storage_path })
    }

    fn tasks_dir(&self) -> PathBuf {
        self.storage_path.join("tasks")
    }

    fn task_path(&self, key: &str) -> PathBuf {
        self.tasks_dir().join(format!("{}.json", Self::file_stem(key)))
    }

    /// Injective file name for a key: ASCII alphanumerics and `-` pass
    /// through, every other byte becomes `_XX` (uppercase hex).
    fn file_stem(key: &str) -> String {
        let mut stem = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                stem.push(byte as char);
            } else {
                stem.push_str(&format!("_{:02X}", byte));
            }
        }
        stem
    }
}

#[async_trait]
impl DescriptorStore for FileDescriptorStore {
    async fn load(&self, key: &str) -> SchedulerResult<Option<TaskDescriptor>> {
        let path = self.task_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| SchedulerError::Store(format!("Failed to read task file: {}", e)))?;

        let descriptor: TaskDescriptor = serde_json::from_str(&content).map_err(|e| {
            SchedulerError::Store(format!("Failed to deserialize task: {}", e))
        })?;

        // A hand-edited file may carry another key; the stored key wins.
        if descriptor.key != key {
            return Ok(None);
        }

        Ok(Some(descriptor))
    }

    async fn load_all(&self) -> SchedulerResult<Vec<TaskDescriptor>> {
        let tasks_dir = self.tasks_dir();

        if !tasks_dir.exists() {
            return Ok(Vec::new());
        }

        let mut descriptors = Vec::new();
        let mut entries = fs::read_dir(&tasks_dir).await.map_err(|e| {
            SchedulerError::Store(format!("Failed to read tasks directory: {}", e))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            SchedulerError::Store(format!("Failed to read directory entry: {}", e))
        })? {
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "json") {
                match fs::read_to_string(&path).await {
                    Ok(content) => match serde_json::from_str::<TaskDescriptor>(&content) {
                        Ok(descriptor) => descriptors.push(descriptor),
                        Err(e) => {
                            warn!("Failed to deserialize task from {:?}: {}", path, e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read task file {:?}: {}", path, e);
                    }
                }
            }
        }

        debug!("Loaded {} task descriptors from {:?}", descriptors.len(), tasks_dir);
        Ok(descriptors)
    }

    async fn save(&self, descriptor: &TaskDescriptor) -> SchedulerResult<()> {
        let path = self.task_path(&descriptor.key);

        let content = serde_json::to_string_pretty(descriptor)
            .map_err(|e| SchedulerError::Store(format!("Failed to serialize task: {}", e)))?;

        fs::write(&path, content)
            .await
            .map_err(|e| SchedulerError::Store(format!("Failed to write task file: {}", e)))?;

        debug!("Saved task '{}' to {:?}", descriptor.key, path);
        Ok(())
    }

    async fn delete(&self, key: &str) -> SchedulerResult<()> {
        let path = self.task_path(key);

        if path.exists() {
            fs::remove_file(&path).await.map_err(|e| {
                SchedulerError::Store(format!("Failed to delete task file: {}", e))
            })?;
            debug!("Deleted task '{}' from {:?}", key, path);
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
