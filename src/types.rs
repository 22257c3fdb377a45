//! Core data types: tasks, statistics, and per-request results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Methods matched by the `"*"` wildcard in a task's method list.
pub const COMMON_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Fallback session duration in seconds when a task declares none.
pub const DEFAULT_DURATION_SECS: u64 = 30;

/// Fallback sampling rate when a task declares none.
pub const DEFAULT_SAMPLE_RATE: u64 = 1;

/// Fallback profile type when a task declares none.
pub const DEFAULT_PROFILE_TYPE: &str = "cpu";

/// A single operator-declared profiling task.
///
/// Tasks are read from a configuration source and describe which route
/// template to profile, until when, for how long per session, how often,
/// and with which profiling mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingTask {
    /// Route template, e.g. `/users/:id`. Must start with `/`.
    pub path: String,

    /// HTTP methods to match. Empty means `GET` only; `"*"` expands to the
    /// common methods. Comparison is case-insensitive.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Hard cutoff: once `now >= expires_at` the task is inert.
    pub expires_at: DateTime<Utc>,

    /// Maximum wall time of one session, in seconds. 0 means 30.
    #[serde(default)]
    pub duration: u64,

    /// Profile every Nth matching request. 0 means 1 (every request).
    #[serde(default)]
    pub sample_rate: u64,

    /// Profiling mode: one of `cpu`, `heap`, `goroutine` (`tasks` is
    /// accepted as an alias), or a custom registered type. Empty means
    /// `cpu`; unknown values fail at session start, not at admission.
    #[serde(default)]
    pub profile_type: String,
}

impl ProfilingTask {
    /// Replace zero/empty fields with their documented defaults.
    ///
    /// After this call `duration` and `sample_rate` are positive,
    /// `profile_type` is non-empty, and `methods` is non-empty.
    pub fn apply_defaults(&mut self) {
        if self.duration == 0 {
            self.duration = DEFAULT_DURATION_SECS;
        }
        if self.sample_rate == 0 {
            self.sample_rate = DEFAULT_SAMPLE_RATE;
        }
        if self.profile_type.is_empty() {
            self.profile_type = DEFAULT_PROFILE_TYPE.to_string();
        }
        if self.methods.is_empty() {
            self.methods = vec!["GET".to_string()];
        }
    }

    /// Whether this task matches the given request method.
    ///
    /// An empty method list matches `GET` only. A list containing `"*"`
    /// matches the common methods (GET, POST, PUT, DELETE). Comparison is
    /// case-insensitive.
    #[must_use]
    pub fn matches_method(&self, method: &str) -> bool {
        if self.methods.is_empty() {
            return method.eq_ignore_ascii_case("GET");
        }

        if contains_ignore_case(&self.methods, "*") {
            return COMMON_METHODS
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method));
        }

        contains_ignore_case(&self.methods, method)
    }

    /// All methods this task will match, with `"*"` expanded.
    #[must_use]
    pub fn effective_methods(&self) -> Vec<String> {
        if self.methods.is_empty() {
            return vec!["GET".to_string()];
        }

        let mut result = Vec::new();
        for method in &self.methods {
            if method == "*" {
                result.extend(COMMON_METHODS.iter().map(|m| (*m).to_string()));
            } else {
                result.push(method.clone());
            }
        }
        result
    }

    /// Whether the task is inert at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The bounded wall time of one session. Never zero: an undeclared
    /// duration falls back to 30 seconds.
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        if self.duration == 0 {
            Duration::from_secs(DEFAULT_DURATION_SECS)
        } else {
            Duration::from_secs(self.duration)
        }
    }
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|s| s.eq_ignore_ascii_case(needle))
}

/// Counters maintained by the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct ProfilingStats {
    /// Sum of the per-path sampling counters.
    pub total_requests: u64,

    /// Sessions successfully started.
    pub profiled_count: u64,

    /// Failures across admission, session start/stop and storage.
    pub failed_count: u64,

    /// Sessions currently in flight.
    pub active_profiles: i64,

    /// When the task table last changed.
    pub last_update: DateTime<Utc>,
}

/// Outcome of one profiling session, as reported by
/// [`Manager::stop_profiling`](crate::Manager::stop_profiling).
#[derive(Debug, Clone, Serialize)]
pub struct ProfilingResult {
    /// Route template that was profiled.
    pub path: String,

    /// When the session started.
    pub start_time: DateTime<Utc>,

    /// Session wall time in milliseconds.
    pub duration_ms: u64,

    /// Storage filename of the artifact, when one was written.
    pub filename: Option<String>,

    /// Artifact size in bytes.
    pub file_size: u64,

    /// Profiling mode of the session.
    pub profile_type: String,

    /// Whether the session captured (and, if non-empty, persisted) its
    /// artifact.
    pub success: bool,

    /// Error text when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
