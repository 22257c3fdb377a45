//! Artifact storage backends.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Storage backend for profiling artifacts.
///
/// Filenames are relative to the backend root and may contain `/`; backends
/// materialize intermediate directories where that applies.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write an artifact, overwriting any existing entry.
    async fn save(&self, filename: &str, data: &[u8]) -> Result<()>;

    /// Filenames matching a shell-style glob pattern, relative to the root.
    async fn list(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove an entry. Removing a non-existent entry is not an error.
    async fn delete(&self, filename: &str) -> Result<()>;

    /// Remove all entries last modified before `now - max_age`.
    async fn clean(&self, max_age: Duration) -> Result<()>;
}
