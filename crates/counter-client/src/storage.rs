//! Durable backing for the offline queue.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::queue::PendingChange;

/// Where the offline queue keeps its entries between runs.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    /// Load every stored entry, oldest first. Missing storage is an empty queue.
    async fn load(&self) -> Result<Vec<PendingChange>>;

    /// Replace the stored entries.
    async fn save(&self, changes: &[PendingChange]) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// A JSON file. Writes go to a sibling temp file that is renamed over the
/// target, so a crash mid-write leaves the previous queue intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl QueueStorage for FileStorage {
    async fn load(&self) -> Result<Vec<PendingChange>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, changes: &[PendingChange]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(changes)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), entries = changes.len(), "Queue saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps entries for the life of the process only.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    changes: Mutex<Vec<PendingChange>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStorage for MemoryStorage {
    async fn load(&self) -> Result<Vec<PendingChange>> {
        Ok(self
            .changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, changes: &[PendingChange]) -> Result<()> {
        *self.changes.lock().unwrap_or_else(PoisonError::into_inner) = changes.to_vec();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Operation;

    fn change(counter_id: &str, delta: i64) -> PendingChange {
        PendingChange::new(counter_id, Operation::Delta { delta })
    }

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("queue.json"));

        assert!(storage.load().await.unwrap().is_empty());

        let changes = vec![change("c1", 3), change("c2", -1)];
        storage.save(&changes).await.unwrap();
        assert_eq!(storage.load().await.unwrap(), changes);
        assert!(!storage.temp_path().exists());

        storage.clear().await.unwrap();
        assert!(storage.load().await.unwrap().is_empty());
        // Clearing twice is fine
        storage.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested/deeper/queue.json"));
        storage.save(&[change("c1", 1)]).await.unwrap();
        assert_eq!(storage.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_storage_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(path);
        assert!(storage.load().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.save(&[change("c1", 2)]).await.unwrap();
        assert_eq!(storage.load().await.unwrap().len(), 1);
        storage.clear().await.unwrap();
        assert!(storage.load().await.unwrap().is_empty());
    }
}
