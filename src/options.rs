//! Coordinator options.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the profiling coordinator.
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum number of concurrent profiling sessions.
    pub max_concurrent: usize,

    /// Session duration applied when a task declares none.
    pub default_duration: Duration,

    /// Interval between maintenance sweeps (storage clean + expired tasks).
    pub cleanup_interval: Duration,

    /// Artifacts older than this are removed by the maintenance sweep.
    pub max_file_age: Duration,

    /// Master switch; when false every admission is refused.
    pub enabled: bool,

    /// Base directory for the default file storage backend.
    pub profile_dir: PathBuf,

    /// Sampling rate applied when a task declares none.
    pub default_sample_rate: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_duration: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(10 * 60),
            max_file_age: Duration::from_secs(24 * 60 * 60),
            enabled: true,
            profile_dir: PathBuf::from("./profiles"),
            default_sample_rate: 1,
        }
    }
}

impl Options {
    /// Set the maximum number of concurrent sessions.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the fallback session duration.
    #[must_use]
    pub const fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// Set the maintenance sweep interval.
    #[must_use]
    pub const fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the maximum artifact age.
    #[must_use]
    pub const fn with_max_file_age(mut self, age: Duration) -> Self {
        self.max_file_age = age;
        self
    }

    /// Enable or disable profiling altogether.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the artifact directory used by the default storage backend.
    #[must_use]
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = dir.into();
        self
    }

    /// Set the fallback sampling rate.
    #[must_use]
    pub const fn with_default_sample_rate(mut self, rate: u64) -> Self {
        self.default_sample_rate = rate;
        self
    }
}
