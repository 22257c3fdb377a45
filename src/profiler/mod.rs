//! Profiling modes and session lifecycle.
//!
//! A [`Profiler`] is a factory for one profiling mode; a [`ProfileSession`]
//! is one bounded-duration capture. Sessions are terminated exactly once by
//! whichever comes first: the duration timer armed at start, or an explicit
//! [`ProfileSession::stop`] call. `stop` is idempotent and safe against
//! concurrent callers; losers observe the bytes captured by the winner.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::types::ProfilingTask;

pub mod cpu;
pub mod heap;
pub mod tasks;

pub use cpu::CpuProfiler;
pub use heap::HeapProfiler;
pub use tasks::TaskDumpProfiler;

/// Factory for one profiling mode.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// The mode string this profiler handles, e.g. `"cpu"`.
    fn profile_type(&self) -> &'static str;

    /// Start a session for `task`. Must be non-blocking; the returned session
    /// already has its duration timer armed.
    async fn start(&self, task: &ProfilingTask) -> Result<Arc<dyn ProfileSession>>;
}

/// One active profiling capture.
#[async_trait]
pub trait ProfileSession: Send + Sync {
    /// Stop the session and return the captured artifact bytes.
    ///
    /// Idempotent: a second call returns the already-captured bytes without
    /// error. Some modes legitimately return empty bytes when nothing was
    /// sampled.
    async fn stop(&self) -> Result<Vec<u8>>;

    /// When the session started.
    fn start_time(&self) -> DateTime<Utc>;

    /// Whether the session is still capturing.
    fn is_running(&self) -> bool;
}

/// Arm the duration timer for a freshly started session.
///
/// The timer fires `stop` once the task's window elapses; an explicit stop
/// that arrives earlier wins and the timer's call becomes a no-op.
pub(crate) fn arm_session_timer(session: Arc<dyn ProfileSession>, task: &ProfilingTask) {
    let timeout = task.session_timeout();
    let profile_type = task.profile_type.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if session.is_running() {
            debug!(
                profile_type = %profile_type,
                timeout_secs = timeout.as_secs(),
                "profiling window elapsed, capturing"
            );
            let _ = session.stop().await;
        }
    });
}

/// Mapping from mode string to profiler.
pub struct ProfilerRegistry {
    profilers: HashMap<&'static str, Arc<dyn Profiler>>,
}

impl ProfilerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            profilers: HashMap::new(),
        }
    }

    /// A registry with the built-in modes (`cpu`, `heap`, `goroutine`)
    /// installed. The task dump behind `goroutine` is also reachable under a
    /// `tasks` alias.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CpuProfiler::default()));
        registry.register(Arc::new(HeapProfiler));

        let task_dump: Arc<dyn Profiler> = Arc::new(TaskDumpProfiler);
        registry.register(task_dump.clone());
        registry.register_as("tasks", task_dump);

        registry
    }

    /// Register a profiler for its mode string, replacing any previous one.
    pub fn register(&mut self, profiler: Arc<dyn Profiler>) {
        self.register_as(profiler.profile_type(), profiler);
    }

    /// Register a profiler under an explicit mode string, e.g. an alias.
    pub fn register_as(&mut self, profile_type: &'static str, profiler: Arc<dyn Profiler>) {
        debug!(profile_type, "profiler registered");
        self.profilers.insert(profile_type, profiler);
    }

    /// Look up the profiler for a mode string.
    #[must_use]
    pub fn get(&self, profile_type: &str) -> Option<Arc<dyn Profiler>> {
        self.profilers.get(profile_type).cloned()
    }

    /// Registered mode strings.
    #[must_use]
    pub fn profile_types(&self) -> Vec<&'static str> {
        self.profilers.keys().copied().collect()
    }
}

impl Default for ProfilerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_builtin_modes() {
        let registry = ProfilerRegistry::with_defaults();
        assert!(registry.get("cpu").is_some());
        assert!(registry.get("heap").is_some());
        assert!(registry.get("goroutine").is_some());
        assert!(registry.get("wall").is_none());
    }

    #[test]
    fn test_task_dump_alias() {
        let registry = ProfilerRegistry::with_defaults();
        let aliased = registry.get("tasks").expect("tasks alias registered");
        assert_eq!(aliased.profile_type(), "goroutine");
    }

    #[test]
    fn test_registration_replaces() {
        let mut registry = ProfilerRegistry::new();
        assert!(registry.get("cpu").is_none());
        registry.register(Arc::new(CpuProfiler::default()));
        assert!(registry.get("cpu").is_some());
        assert_eq!(registry.profile_types(), ["cpu"]);
    }
}
