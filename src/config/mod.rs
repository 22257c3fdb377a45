//! Configuration sources for profiling tasks.
//!
//! Two document shapes are accepted:
//!
//! ```yaml
//! # canonical
//! profiles:
//!   - path: "/api/users/:id"
//!     methods: ["GET", "POST"]
//!     expires_at: "2025-12-31T23:59:59Z"
//!     duration: 10
//!     sample_rate: 1
//!     profile_type: "cpu"
//!
//! # legacy: path -> expiry, everything else defaulted
//! /api/users/:id: "2025-12-31T23:59:59Z"
//! ```
//!
//! Records already expired at parse time are dropped. A well-formed YAML
//! document matching neither shape is a parse error, never an implicit empty
//! task list.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::ProfilingTask;

pub mod file;

pub use file::FileConfig;

/// Callback invoked with the full new task list on configuration changes.
/// May be called from an arbitrary thread.
pub type TaskCallback = Arc<dyn Fn(Vec<ProfilingTask>) + Send + Sync>;

/// A source of profiling task declarations.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Current declaration. Never partial; an empty list means "no tasks".
    async fn tasks(&self) -> Result<Vec<ProfilingTask>>;

    /// Register a callback for declaration changes. Sources without push
    /// semantics may accept the callback and never invoke it.
    async fn subscribe(&self, callback: TaskCallback) -> Result<()>;

    /// Release any resources held by the provider.
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ProfilesDocument {
    #[serde(default)]
    profiles: Vec<ProfilingTask>,
}

/// Parse a configuration document into normalized tasks.
///
/// # Errors
///
/// Returns [`Error::ConfigParse`] when the document is not valid YAML or is
/// well-formed but matches neither accepted shape.
pub fn parse_tasks(data: &str) -> Result<Vec<ProfilingTask>> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_yaml::Value =
        serde_yaml::from_str(data).map_err(|e| Error::ConfigParse(e.to_string()))?;

    if value.is_null() {
        return Ok(Vec::new());
    }

    if value.get("profiles").is_some() {
        let doc: ProfilesDocument =
            serde_yaml::from_value(value).map_err(|e| Error::ConfigParse(e.to_string()))?;
        return Ok(normalize_tasks(doc.profiles));
    }

    let simple: HashMap<String, String> =
        serde_yaml::from_value(value).map_err(|e| Error::ConfigParse(e.to_string()))?;
    Ok(upgrade_legacy(simple))
}

/// Apply defaults and drop records already expired.
pub(crate) fn normalize_tasks(tasks: Vec<ProfilingTask>) -> Vec<ProfilingTask> {
    let now = Utc::now();
    let mut valid = Vec::with_capacity(tasks.len());

    for mut task in tasks {
        if task.is_expired(now) {
            warn!(path = %task.path, expires_at = %task.expires_at.to_rfc3339(), "task expired");
            continue;
        }
        task.apply_defaults();
        valid.push(task);
    }

    valid
}

fn upgrade_legacy(raw: HashMap<String, String>) -> Vec<ProfilingTask> {
    let now = Utc::now();
    let mut valid = Vec::with_capacity(raw.len());

    for (path, expires) in raw {
        let expires_at = match DateTime::parse_from_rfc3339(&expires) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                warn!(path = %path, expires_at = %expires, error = %e, "invalid expiry timestamp");
                continue;
            }
        };

        if now >= expires_at {
            warn!(path = %path, expires_at = %expires, "task expired");
            continue;
        }

        let mut task = ProfilingTask {
            path,
            methods: Vec::new(),
            expires_at,
            duration: 0,
            sample_rate: 0,
            profile_type: String::new(),
        };
        task.apply_defaults();
        valid.push(task);
    }

    valid
}

/// In-memory provider for tests and programmatic control.
#[derive(Default)]
pub struct StaticConfig {
    tasks: RwLock<Vec<ProfilingTask>>,
    subscribers: RwLock<Vec<TaskCallback>>,
}

impl StaticConfig {
    /// A provider serving the given declaration.
    #[must_use]
    pub fn new(tasks: Vec<ProfilingTask>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Replace the declaration and notify subscribers.
    pub async fn set_tasks(&self, tasks: Vec<ProfilingTask>) {
        *self.tasks.write().await = tasks.clone();
        for callback in self.subscribers.read().await.iter() {
            callback(tasks.clone());
        }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfig {
    async fn tasks(&self) -> Result<Vec<ProfilingTask>> {
        Ok(self.tasks.read().await.clone())
    }

    async fn subscribe(&self, callback: TaskCallback) -> Result<()> {
        self.subscribers.write().await.push(callback);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
