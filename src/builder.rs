//! Fluent assembly of a profiling [`Manager`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::config::{ConfigProvider, FileConfig};
use crate::error::Result;
use crate::manager::Manager;
use crate::options::Options;
use crate::profiler::{Profiler, ProfilerRegistry};
use crate::storage::{FileStorage, MemoryStorage, Storage};

/// Config file consulted when no provider is configured explicitly.
const DEFAULT_CONFIG_PATH: &str = "axum-pprof.yaml";

enum StorageChoice {
    Default,
    File(PathBuf),
    Memory,
    Custom(Arc<dyn Storage>),
}

/// Builds a [`Manager`] from a configuration source, a storage backend, and
/// optional extra profiling modes.
///
/// ```rust,no_run
/// # async fn build() -> axum_pprof::Result<()> {
/// let manager = axum_pprof::ProfilerBuilder::new()
///     .with_file_config("profiling.yaml")
///     .with_file_storage("./profiles")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ProfilerBuilder {
    options: Options,
    provider: Option<Arc<dyn ConfigProvider>>,
    storage: StorageChoice,
    extra_profilers: Vec<Arc<dyn Profiler>>,
}

impl ProfilerBuilder {
    /// A builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: Options::default(),
            provider: None,
            storage: StorageChoice::Default,
            extra_profilers: Vec::new(),
        }
    }

    /// Replace the coordinator options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Read tasks from a YAML file with live reload.
    #[must_use]
    pub fn with_file_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.provider = Some(Arc::new(FileConfig::new(path)));
        self
    }

    /// Use a custom configuration provider.
    #[must_use]
    pub fn with_config_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Store artifacts as files under `dir`.
    #[must_use]
    pub fn with_file_storage(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage = StorageChoice::File(dir.into());
        self
    }

    /// Keep artifacts in memory (tests, ephemeral deployments).
    #[must_use]
    pub fn with_memory_storage(mut self) -> Self {
        self.storage = StorageChoice::Memory;
        self
    }

    /// Use a custom storage backend.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = StorageChoice::Custom(storage);
        self
    }

    /// Register an additional profiling mode on top of the built-in ones.
    #[must_use]
    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.extra_profilers.push(profiler);
        self
    }

    /// Assemble the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) when the file
    /// storage directory cannot be created.
    pub async fn build(self) -> Result<Arc<Manager>> {
        let provider = self.provider.unwrap_or_else(|| {
            warn!(
                path = DEFAULT_CONFIG_PATH,
                "no config provider specified, using the default file config"
            );
            Arc::new(FileConfig::new(DEFAULT_CONFIG_PATH))
        });

        let storage: Arc<dyn Storage> = match self.storage {
            StorageChoice::Default => Arc::new(FileStorage::new(&self.options.profile_dir)?),
            StorageChoice::File(dir) => Arc::new(FileStorage::new(dir)?),
            StorageChoice::Memory => Arc::new(MemoryStorage::new()),
            StorageChoice::Custom(storage) => storage,
        };

        let mut registry = ProfilerRegistry::with_defaults();
        for profiler in self.extra_profilers {
            registry.register(profiler);
        }

        Ok(Manager::new(self.options, provider, storage, registry).await)
    }
}

impl Default for ProfilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
