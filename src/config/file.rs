//! YAML file configuration provider with live reload.
//!
//! Reloads are driven by a debounced filesystem watcher on the file's parent
//! directory, so editors that replace the file (rename-over) are observed as
//! well as in-place writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info};

use super::{parse_tasks, ConfigProvider, TaskCallback};
use crate::error::{Error, Result};
use crate::types::ProfilingTask;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Reads profiling tasks from a YAML file.
///
/// A missing file means "no tasks"; create and populate it to enable
/// profiling without restarting the process.
pub struct FileConfig {
    path: PathBuf,
    debounce: Duration,
    watchers: Mutex<Vec<oneshot::Sender<()>>>,
}

impl FileConfig {
    /// A provider reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce: DEFAULT_DEBOUNCE,
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Override the watch debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    async fn read_tasks(path: &Path) -> Result<Vec<ProfilingTask>> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    file = %path.display(),
                    "config file not found, profiling is idle until it appears"
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "failed to read config file {}: {e}",
                    path.display()
                )))
            }
        };

        parse_tasks(&data)
    }
}

#[async_trait]
impl ConfigProvider for FileConfig {
    async fn tasks(&self) -> Result<Vec<ProfilingTask>> {
        Self::read_tasks(&self.path).await
    }

    async fn subscribe(&self, callback: TaskCallback) -> Result<()> {
        let watch_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = self.path.file_name().map(std::ffi::OsString::from);

        // The debouncer callback runs on the watcher's own thread; forward
        // relevant events into the runtime over a channel.
        let (event_tx, mut event_rx) = mpsc::channel::<()>(8);
        let mut debouncer = new_debouncer(
            self.debounce,
            move |res: notify_debouncer_mini::DebounceEventResult| {
                if let Ok(events) = res {
                    let relevant = events
                        .iter()
                        .any(|e| e.path.file_name().map(std::ffi::OsString::from) == file_name);
                    if relevant {
                        let _ = event_tx.blocking_send(());
                    }
                }
            },
        )
        .map_err(|e| Error::Watch(format!("failed to create file watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::Watch(format!("failed to watch {}: {e}", watch_dir.display()))
            })?;

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        self.watchers.lock().await.push(stop_tx);

        let path = self.path.clone();
        tokio::spawn(async move {
            // Keep the debouncer alive for as long as the subscription runs.
            let _debouncer = debouncer;
            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                        match FileConfig::read_tasks(&path).await {
                            Ok(tasks) => {
                                info!(
                                    file = %path.display(),
                                    task_count = tasks.len(),
                                    "config file changed"
                                );
                                callback(tasks);
                            }
                            Err(e) => {
                                error!(file = %path.display(), error = %e, "failed to reload config");
                            }
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            debug!(file = %path.display(), "config watcher stopped");
        });

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for stop in self.watchers.lock().await.drain(..) {
            let _ = stop.send(());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_means_no_tasks() {
        let dir = TempDir::new().expect("temp dir");
        let provider = FileConfig::new(dir.path().join("absent.yaml"));

        let tasks = provider.tasks().await.expect("tasks");
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_reads_canonical_document() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("profiling.yaml");
        std::fs::write(
            &path,
            r#"
profiles:
  - path: "/api/users/:id"
    expires_at: "2099-12-31T23:59:59Z"
"#,
        )
        .expect("write config");

        let provider = FileConfig::new(&path);
        let tasks = provider.tasks().await.expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].path, "/api/users/:id");
    }

    #[tokio::test]
    async fn test_malformed_document_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("profiling.yaml");
        std::fs::write(&path, "- 1\n- 2\n").expect("write config");

        let provider = FileConfig::new(&path);
        assert!(provider.tasks().await.is_err());
    }

    #[tokio::test]
    async fn test_subscribe_and_close() {
        let dir = TempDir::new().expect("temp dir");
        let provider = FileConfig::new(dir.path().join("profiling.yaml"));

        provider
            .subscribe(Arc::new(|_tasks| {}))
            .await
            .expect("subscribe");
        provider.close().await.expect("close");
    }
}
