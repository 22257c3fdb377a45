//! Error taxonomy for the profiling pipeline.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the profiling pipeline.
///
/// Admission refusals (sampling miss, expired task, no free permit, profiling
/// disabled) are deliberately *not* represented here: they are ordinary
/// outcomes of [`Manager::should_profile`](crate::Manager::should_profile),
/// not failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration document could not be parsed into profiling tasks.
    /// The coordinator keeps the previous task table when this occurs.
    #[error("invalid profiling config: {0}")]
    ConfigParse(String),

    /// A task referenced a profile type with no registered profiler.
    #[error("no profiler registered for type {0:?}")]
    UnknownProfileType(String),

    /// The requested profiler cannot start another session right now,
    /// e.g. the process-global CPU sampler is already attached.
    #[error("profiler busy: {0}")]
    ProfilerBusy(String),

    /// A profiling session failed to start or to capture its artifact.
    #[error("profiling session failed: {0}")]
    Session(String),

    /// The storage backend rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem-level failure outside the storage contract.
    #[error("I/O error: {0}")]
    Io(String),

    /// The configuration file watcher could not be installed.
    #[error("config watch error: {0}")]
    Watch(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
