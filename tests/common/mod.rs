//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use axum_pprof::config::StaticConfig;
use axum_pprof::profiler::{ProfileSession, Profiler};
use axum_pprof::storage::MemoryStorage;
use axum_pprof::{Error, Manager, Options, ProfilerBuilder, ProfilingTask, Result};

/// A deterministic profiler standing in for the real `cpu` mode.
pub struct MockProfiler {
    mode: &'static str,
    payload: Vec<u8>,
    fail_start: bool,
    pub started: AtomicUsize,
}

impl MockProfiler {
    pub fn new(payload: &[u8]) -> Self {
        Self {
            mode: "cpu",
            payload: payload.to_vec(),
            fail_start: false,
            started: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: "cpu",
            payload: Vec::new(),
            fail_start: true,
            started: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Profiler for MockProfiler {
    fn profile_type(&self) -> &'static str {
        self.mode
    }

    async fn start(&self, _task: &ProfilingTask) -> Result<Arc<dyn ProfileSession>> {
        if self.fail_start {
            return Err(Error::ProfilerBusy("mock profiler refuses to start".to_string()));
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            start_time: Utc::now(),
            payload: self.payload.clone(),
            running: AtomicBool::new(true),
        }))
    }
}

struct MockSession {
    start_time: DateTime<Utc>,
    payload: Vec<u8>,
    running: AtomicBool,
}

#[async_trait]
impl ProfileSession for MockSession {
    async fn stop(&self) -> Result<Vec<u8>> {
        self.running.store(false, Ordering::Release);
        Ok(self.payload.clone())
    }

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// A task expiring in one hour with the given sampling rate.
pub fn task(path: &str, methods: &[&str], sample_rate: u64) -> ProfilingTask {
    ProfilingTask {
        path: path.to_string(),
        methods: methods.iter().map(|m| (*m).to_string()).collect(),
        expires_at: Utc::now() + TimeDelta::hours(1),
        duration: 2,
        sample_rate,
        profile_type: "cpu".to_string(),
    }
}

pub struct Fixture {
    pub manager: Arc<Manager>,
    pub storage: Arc<MemoryStorage>,
    pub provider: Arc<StaticConfig>,
}

/// Build a manager over memory storage and a static provider, with the
/// `cpu` mode replaced by [`MockProfiler`].
pub async fn mock_manager(options: Options, tasks: Vec<ProfilingTask>, payload: &[u8]) -> Fixture {
    mock_manager_with(options, tasks, Arc::new(MockProfiler::new(payload))).await
}

pub async fn mock_manager_with(
    options: Options,
    tasks: Vec<ProfilingTask>,
    profiler: Arc<MockProfiler>,
) -> Fixture {
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(StaticConfig::new(tasks));

    let manager = ProfilerBuilder::new()
        .with_options(options)
        .with_config_provider(provider.clone())
        .with_storage(storage.clone())
        .with_profiler(profiler)
        .build()
        .await
        .expect("build manager");

    Fixture {
        manager,
        storage,
        provider,
    }
}
