//! Filesystem-backed artifact storage.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Storage;
use crate::error::{Error, Result};

/// Pattern swept by [`FileStorage::clean`]. Artifacts live under per-type
/// subdirectories, so the sweep must recurse.
const CLEAN_PATTERN: &str = "**/*.pprof";

/// Stores artifacts as files under a base directory.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `base_dir`, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the directory cannot be created.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| {
            Error::Storage(format!(
                "failed to create profile directory {}: {e}",
                base_dir.display()
            ))
        })?;
        Ok(Self { base_dir })
    }

    /// The directory artifacts are stored under.
    #[must_use]
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, filename: &str, data: &[u8]) -> Result<()> {
        let path = self.base_dir.join(filename);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Storage(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::Storage(format!("failed to write {filename}: {e}")))?;

        info!(filename, size = data.len(), "profile saved");
        Ok(())
    }

    async fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let full_pattern = self.base_dir.join(pattern).to_string_lossy().into_owned();
        let base_dir = self.base_dir.clone();

        tokio::task::spawn_blocking(move || {
            let paths = glob::glob(&full_pattern)
                .map_err(|e| Error::Storage(format!("invalid pattern: {e}")))?;

            let mut names = Vec::new();
            for path in paths.flatten() {
                if let Ok(rel) = path.strip_prefix(&base_dir) {
                    names.push(rel.to_string_lossy().into_owned());
                }
            }
            Ok(names)
        })
        .await
        .map_err(|e| Error::Storage(format!("list task failed: {e}")))?
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        let path = self.base_dir.join(filename);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(filename, "profile deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("failed to delete {filename}: {e}"))),
        }
    }

    async fn clean(&self, max_age: Duration) -> Result<()> {
        let now = SystemTime::now();
        let mut cleaned = 0usize;

        for filename in self.list(CLEAN_PATTERN).await? {
            let path = self.base_dir.join(&filename);

            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };

            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > max_age {
                match self.delete(&filename).await {
                    Ok(()) => cleaned += 1,
                    Err(e) => warn!(filename, error = %e, "failed to clean profile"),
                }
            }
        }

        if cleaned > 0 {
            info!(cleaned, max_age_secs = max_age.as_secs(), "profile cleanup completed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, FileStorage) {
        let dir = TempDir::new().expect("create temp dir");
        let storage = FileStorage::new(dir.path()).expect("create storage");
        (dir, storage)
    }

    #[tokio::test]
    async fn test_save_creates_subdirectories() {
        let (dir, storage) = storage();

        storage
            .save("cpu/profile_a.pprof", b"data")
            .await
            .expect("save");

        let on_disk = std::fs::read(dir.path().join("cpu/profile_a.pprof")).expect("read back");
        assert_eq!(on_disk, b"data");
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let (dir, storage) = storage();

        storage.save("cpu/a.pprof", b"one").await.expect("save");
        storage.save("cpu/a.pprof", b"two").await.expect("save again");

        let on_disk = std::fs::read(dir.path().join("cpu/a.pprof")).expect("read back");
        assert_eq!(on_disk, b"two");
    }

    #[tokio::test]
    async fn test_list_by_pattern() {
        let (_dir, storage) = storage();

        storage.save("cpu/a.pprof", b"x").await.expect("save");
        storage.save("heap/b.pprof", b"y").await.expect("save");

        let cpu = storage.list("cpu/*.pprof").await.expect("list cpu");
        assert_eq!(cpu, ["cpu/a.pprof"]);

        let mut all = storage.list("**/*.pprof").await.expect("list all");
        all.sort();
        assert_eq!(all, ["cpu/a.pprof", "heap/b.pprof"]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let (_dir, storage) = storage();
        storage.delete("cpu/none.pprof").await.expect("delete missing");
    }

    #[tokio::test]
    async fn test_clean_removes_old_entries() {
        let (_dir, storage) = storage();

        storage.save("cpu/old.pprof", b"x").await.expect("save");
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Everything written before this instant is older than zero.
        storage.clean(Duration::ZERO).await.expect("clean");

        let left = storage.list("**/*.pprof").await.expect("list");
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn test_clean_keeps_fresh_entries() {
        let (_dir, storage) = storage();

        storage.save("cpu/fresh.pprof", b"x").await.expect("save");
        storage.clean(Duration::from_secs(3600)).await.expect("clean");

        let left = storage.list("cpu/*.pprof").await.expect("list");
        assert_eq!(left, ["cpu/fresh.pprof"]);
    }
}
