//! The profiling coordinator.
//!
//! Owns the task table, decides per-request whether to profile, manages
//! session lifecycle and artifact handoff to storage, and runs the background
//! maintenance worker that sweeps expired tasks and aged-out artifacts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tokio::sync::{mpsc, watch, Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ConfigProvider;
use crate::error::{Error, Result};
use crate::matcher::RouteMatcher;
use crate::options::Options;
use crate::profiler::{ProfileSession, ProfilerRegistry};
use crate::storage::Storage;
use crate::types::{ProfilingResult, ProfilingStats, ProfilingTask};

/// A task plus its sampling counter. The counter ticks on every sampling
/// check for the path, not on every matched request.
struct TaskEntry {
    task: ProfilingTask,
    hits: AtomicU64,
}

struct TaskTable {
    tasks: HashMap<String, Arc<TaskEntry>>,
    last_update: DateTime<Utc>,
}

/// A positive admission decision: the matched task snapshot plus the held
/// concurrency permit. Dropping an admission without starting a session
/// releases the permit.
pub struct Admission {
    /// The task that matched the request.
    pub task: ProfilingTask,
    permit: OwnedSemaphorePermit,
}

/// A running profiling session owned by the request that opened it, until it
/// is handed back to [`Manager::stop_profiling`]. The concurrency permit is
/// released when this value is dropped, whatever the exit path.
pub struct ActiveProfile {
    /// The task the session was opened for.
    pub task: ProfilingTask,
    session: Arc<dyn ProfileSession>,
    permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for ActiveProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveProfile").field("task", &self.task).finish()
    }
}

/// Coordinates configuration sync, admission, sessions, and maintenance.
pub struct Manager {
    options: Options,
    table: RwLock<TaskTable>,
    profiled_count: AtomicU64,
    failed_count: AtomicU64,
    active_profiles: AtomicI64,
    limiter: Arc<Semaphore>,
    registry: ProfilerRegistry,
    storage: Arc<dyn Storage>,
    provider: Arc<dyn ConfigProvider>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    // Held so the update channel outlives a failed or absent subscription.
    _update_tx: mpsc::Sender<Vec<ProfilingTask>>,
}

impl Manager {
    /// Create the coordinator: install the provider's current declaration,
    /// subscribe to changes, and start the maintenance worker.
    pub async fn new(
        options: Options,
        provider: Arc<dyn ConfigProvider>,
        storage: Arc<dyn Storage>,
        registry: ProfilerRegistry,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (update_tx, update_rx) = mpsc::channel::<Vec<ProfilingTask>>(16);

        let manager = Arc::new(Self {
            limiter: Arc::new(Semaphore::new(options.max_concurrent)),
            table: RwLock::new(TaskTable {
                tasks: HashMap::new(),
                last_update: Utc::now(),
            }),
            profiled_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            active_profiles: AtomicI64::new(0),
            registry,
            storage,
            provider,
            shutdown_tx,
            worker: Mutex::new(None),
            _update_tx: update_tx.clone(),
            options,
        });

        match manager.provider.tasks().await {
            Ok(tasks) => manager.update_tasks(tasks).await,
            Err(e) => error!(error = %e, "failed to load initial profiling config"),
        }

        // Pushes from the provider may arrive on any thread; they are
        // serialized through the update channel drained by the worker.
        let subscription = manager
            .provider
            .subscribe(Arc::new(move |tasks| {
                if let Err(e) = update_tx.try_send(tasks) {
                    warn!(error = %e, "dropped config update push");
                }
            }))
            .await;
        if let Err(e) = subscription {
            error!(error = %e, "failed to subscribe to config changes");
        }

        let worker = tokio::spawn({
            let manager = manager.clone();
            async move { manager.maintenance_loop(update_rx, shutdown_rx).await }
        });
        *manager.worker.lock().await = Some(worker);

        info!(
            max_concurrent = manager.options.max_concurrent,
            enabled = manager.options.enabled,
            profile_dir = %manager.options.profile_dir.display(),
            "profiling manager initialized"
        );

        manager
    }

    /// Decide whether to profile a request.
    ///
    /// Scans the task table for the first entry whose template matches `path`
    /// and whose method set matches `method`, then applies expiry, sampling,
    /// and the concurrency cap. Iteration order over the table is
    /// unspecified: when two templates both match a request either may win,
    /// so operators should keep templates disjoint.
    ///
    /// Returns `None` on any refusal; only a failed permit acquisition counts
    /// toward `failed_count`.
    pub async fn should_profile(&self, path: &str, method: &str) -> Option<Admission> {
        if !self.options.enabled {
            return None;
        }

        let table = self.table.read().await;
        let entry = table.tasks.values().find(|entry| {
            RouteMatcher::matches(&entry.task.path, path) && entry.task.matches_method(method)
        })?;

        if entry.task.is_expired(Utc::now()) {
            return None;
        }

        // The counter ticks on every sampling check so the Nth-request
        // guarantee is independent of permit availability.
        if entry.task.sample_rate > 1 {
            let count = entry.hits.fetch_add(1, Ordering::Relaxed) + 1;
            if count % entry.task.sample_rate != 0 {
                return None;
            }
        }

        match self.limiter.clone().try_acquire_owned() {
            Ok(permit) => Some(Admission {
                task: entry.task.clone(),
                permit,
            }),
            Err(_) => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
                warn!(
                    path,
                    limit = self.options.max_concurrent,
                    "concurrent profiling limit exceeded"
                );
                None
            }
        }
    }

    /// Open a profiling session for an admitted request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProfileType`] when the task references an
    /// unregistered mode, or the profiler's own error when the session cannot
    /// start (e.g. [`Error::ProfilerBusy`] for a second CPU session). The
    /// permit is released and the failure counted on every error path.
    pub async fn start_profiling(&self, path: &str, admission: Admission) -> Result<ActiveProfile> {
        let Admission { task, permit } = admission;

        let Some(profiler) = self.registry.get(&task.profile_type) else {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
            error!(path, profile_type = %task.profile_type, "profiler not found");
            return Err(Error::UnknownProfileType(task.profile_type.clone()));
        };

        let session = match profiler.start(&task).await {
            Ok(session) => session,
            Err(e) => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
                error!(
                    path,
                    profile_type = %task.profile_type,
                    error = %e,
                    "failed to start profiling"
                );
                return Err(e);
            }
        };

        self.active_profiles.fetch_add(1, Ordering::Relaxed);
        self.profiled_count.fetch_add(1, Ordering::Relaxed);

        info!(
            path,
            profile_type = %task.profile_type,
            duration_secs = task.duration,
            "profiling started"
        );

        Ok(ActiveProfile {
            task,
            session,
            permit,
        })
    }

    /// Stop a session and persist its artifact.
    ///
    /// Failures are absorbed into the returned [`ProfilingResult`] and the
    /// statistics; the caller never needs to handle them beyond logging. An
    /// empty artifact is a success with no storage write.
    pub async fn stop_profiling(
        &self,
        path: &str,
        method: &str,
        active: ActiveProfile,
    ) -> ProfilingResult {
        let ActiveProfile {
            task,
            session,
            permit: _permit,
        } = active;

        let start_time = session.start_time();
        let outcome = session.stop().await;
        self.active_profiles.fetch_sub(1, Ordering::Relaxed);

        let duration_ms =
            u64::try_from((Utc::now() - start_time).num_milliseconds()).unwrap_or(0);

        let mut result = ProfilingResult {
            path: path.to_string(),
            start_time,
            duration_ms,
            filename: None,
            file_size: 0,
            profile_type: task.profile_type.clone(),
            success: false,
            error: None,
        };

        let data = match outcome {
            Ok(data) => data,
            Err(e) => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
                error!(path, error = %e, "failed to stop profiling");
                result.error = Some(e.to_string());
                return result;
            }
        };

        if data.is_empty() {
            warn!(path, profile_type = %task.profile_type, "empty profiling data");
            result.success = true;
            return result;
        }

        let filename = self.generate_filename(path, method, &task.profile_type);
        result.filename = Some(filename.clone());
        result.file_size = data.len() as u64;

        if let Err(e) = self.storage.save(&filename, &data).await {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
            error!(path, filename, error = %e, "failed to save profile");
            result.error = Some(e.to_string());
            return result;
        }

        result.success = true;
        info!(
            path,
            filename,
            duration_ms,
            file_size = result.file_size,
            profile_type = %task.profile_type,
            "profiling completed"
        );
        result
    }

    /// Replace the task table with a new declaration.
    ///
    /// Last declaration wins on duplicate paths. Sampling counters are
    /// carried over for surviving paths and pruned for removed ones. Once
    /// this returns, admission behaves as if only the new tasks ever existed.
    pub async fn update_tasks(&self, new_tasks: Vec<ProfilingTask>) {
        let mut table = self.table.write().await;

        let mut tasks = HashMap::with_capacity(new_tasks.len());
        for mut task in new_tasks {
            if task.duration == 0 {
                task.duration = self.options.default_duration.as_secs();
            }
            if task.sample_rate == 0 {
                task.sample_rate = self.options.default_sample_rate;
            }
            task.apply_defaults();

            let hits = table
                .tasks
                .get(&task.path)
                .map(|entry| entry.hits.load(Ordering::Relaxed))
                .unwrap_or(0);
            tasks.insert(
                task.path.clone(),
                Arc::new(TaskEntry {
                    task,
                    hits: AtomicU64::new(hits),
                }),
            );
        }

        let task_count = tasks.len();
        table.tasks = tasks;
        table.last_update = Utc::now();

        info!(task_count, "profiling tasks updated");
    }

    /// Current statistics snapshot.
    pub async fn stats(&self) -> ProfilingStats {
        let table = self.table.read().await;
        let total_requests = table
            .tasks
            .values()
            .map(|entry| entry.hits.load(Ordering::Relaxed))
            .sum();

        ProfilingStats {
            total_requests,
            profiled_count: self.profiled_count.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
            active_profiles: self.active_profiles.load(Ordering::Relaxed),
            last_update: table.last_update,
        }
    }

    /// Snapshot of the task table, keyed by path.
    pub async fn tasks(&self) -> HashMap<String, ProfilingTask> {
        let table = self.table.read().await;
        table
            .tasks
            .iter()
            .map(|(path, entry)| (path.clone(), entry.task.clone()))
            .collect()
    }

    /// Whether profiling is enabled at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// The coordinator's options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Stop the maintenance worker, wait for it to acknowledge, then close
    /// the configuration provider.
    pub async fn close(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        self.provider.close().await?;
        info!("profiling manager closed");
        Ok(())
    }

    async fn maintenance_loop(
        self: Arc<Self>,
        mut updates: mpsc::Receiver<Vec<ProfilingTask>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.options.cleanup_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.storage.clean(self.options.max_file_age).await {
                        error!(error = %e, "storage cleanup failed");
                    }
                    self.sweep_expired_tasks().await;
                }
                update = updates.recv() => {
                    match update {
                        Some(tasks) => self.update_tasks(tasks).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn sweep_expired_tasks(&self) {
        let now = Utc::now();
        let mut table = self.table.write().await;

        let before = table.tasks.len();
        table.tasks.retain(|_, entry| !entry.task.is_expired(now));

        let removed = before - table.tasks.len();
        if removed > 0 {
            info!(removed, "expired profiling tasks swept");
        }
    }

    fn generate_filename(&self, path: &str, method: &str, profile_type: &str) -> String {
        let now = Local::now();
        let timestamp = now.format("%Y%m%d_%H%M%S");
        let micros = now.timestamp_subsec_nanos() % 1_000_000;

        format!(
            "{profile_type}/profile_{}_{method}_{timestamp}_{micros}.pprof",
            sanitize_path(path)
        )
    }
}

/// Replace characters that are unsafe in filenames.
fn sanitize_path(path: &str) -> String {
    path.chars()
        .map(|c| match c {
            '/' | ':' | '*' | '?' | '<' | '>' | '|' | '"' | '\\' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/api/users/:id"), "_api_users__id");
        assert_eq!(sanitize_path("/files/*"), "_files__");
        assert_eq!(sanitize_path(r#"a:b?c<d>e|f"g\h"#), "a_b_c_d_e_f_g_h");
    }
}
