//! In-memory artifact storage, for tests and ephemeral deployments.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::Storage;
use crate::error::{Error, Result};

struct MemoryFile {
    data: Vec<u8>,
    modified: SystemTime,
}

/// Keeps artifacts in a map instead of on disk.
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, MemoryFile>>,
}

impl MemoryStorage {
    /// An empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read back a stored artifact.
    pub async fn get(&self, filename: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(filename).map(|f| f.data.clone())
    }

    /// Number of stored artifacts.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, filename: &str, data: &[u8]) -> Result<()> {
        let mut files = self.files.write().await;
        files.insert(
            filename.to_string(),
            MemoryFile {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
        debug!(filename, size = data.len(), "profile saved to memory");
        Ok(())
    }

    async fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::Storage(format!("invalid pattern: {e}")))?;

        let files = self.files.read().await;
        Ok(files
            .keys()
            .filter(|name| pattern.matches(name))
            .cloned()
            .collect())
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        self.files.write().await.remove(filename);
        Ok(())
    }

    async fn clean(&self, max_age: Duration) -> Result<()> {
        let now = SystemTime::now();
        let mut files = self.files.write().await;
        files.retain(|_, file| {
            now.duration_since(file.modified).unwrap_or(Duration::ZERO) <= max_age
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_get() {
        let storage = MemoryStorage::new();
        storage.save("cpu/a.pprof", b"data").await.expect("save");

        assert_eq!(storage.get("cpu/a.pprof").await, Some(b"data".to_vec()));
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_by_pattern() {
        let storage = MemoryStorage::new();
        storage.save("cpu/a.pprof", b"x").await.expect("save");
        storage.save("heap/b.pprof", b"y").await.expect("save");

        let cpu = storage.list("cpu/*.pprof").await.expect("list");
        assert_eq!(cpu, ["cpu/a.pprof"]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let storage = MemoryStorage::new();
        storage.delete("cpu/none.pprof").await.expect("delete");
    }

    #[tokio::test]
    async fn test_clean_by_age() {
        let storage = MemoryStorage::new();
        storage.save("cpu/a.pprof", b"x").await.expect("save");
        tokio::time::sleep(Duration::from_millis(20)).await;

        storage.clean(Duration::ZERO).await.expect("clean");
        assert!(storage.is_empty().await);
    }
}
