//! CPU profiling backed by the process-global `pprof` sampler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pprof::protos::Message;
use pprof::{ProfilerGuard, ProfilerGuardBuilder};
use tokio::sync::Mutex;

use super::{arm_session_timer, ProfileSession, Profiler};
use crate::error::{Error, Result};
use crate::types::ProfilingTask;

/// 99 Hz rather than 100 to avoid lock-step with periodic timers.
const DEFAULT_FREQUENCY_HZ: i32 = 99;

/// Frames from these libraries are excluded so the sampler does not spend
/// its budget unwinding itself.
const BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];

/// CPU profiling mode.
///
/// The sampler is process-global: at most one CPU session can be attached at
/// a time. Starting a second one fails with [`Error::ProfilerBusy`].
pub struct CpuProfiler {
    frequency: i32,
}

impl CpuProfiler {
    /// A CPU profiler sampling at the given frequency in Hz.
    #[must_use]
    pub const fn new(frequency: i32) -> Self {
        Self { frequency }
    }
}

impl Default for CpuProfiler {
    fn default() -> Self {
        Self::new(DEFAULT_FREQUENCY_HZ)
    }
}

#[async_trait]
impl Profiler for CpuProfiler {
    fn profile_type(&self) -> &'static str {
        "cpu"
    }

    async fn start(&self, task: &ProfilingTask) -> Result<Arc<dyn ProfileSession>> {
        let guard = ProfilerGuardBuilder::default()
            .frequency(self.frequency)
            .blocklist(BLOCKLIST)
            .build()
            .map_err(|e| match e {
                pprof::Error::Running => {
                    Error::ProfilerBusy("CPU sampler already attached".to_string())
                }
                other => Error::Session(format!("failed to start CPU profiling: {other}")),
            })?;

        let session = Arc::new(CpuSession {
            start_time: Utc::now(),
            running: AtomicBool::new(true),
            state: Mutex::new(CpuSessionState {
                guard: Some(guard),
                captured: None,
            }),
        });

        arm_session_timer(session.clone(), task);
        Ok(session)
    }
}

struct CpuSessionState {
    guard: Option<ProfilerGuard<'static>>,
    captured: Option<Vec<u8>>,
}

/// An attached CPU sampling session.
struct CpuSession {
    start_time: DateTime<Utc>,
    running: AtomicBool,
    state: Mutex<CpuSessionState>,
}

#[async_trait]
impl ProfileSession for CpuSession {
    async fn stop(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;

        if let Some(bytes) = &state.captured {
            return Ok(bytes.clone());
        }

        let Some(guard) = state.guard.take() else {
            self.running.store(false, Ordering::Release);
            state.captured = Some(Vec::new());
            return Ok(Vec::new());
        };

        // Report building resolves symbols and can take a while with deep
        // stacks; keep it off the async runtime.
        let outcome = tokio::task::spawn_blocking(move || encode_report(&guard)).await;
        self.running.store(false, Ordering::Release);

        match outcome {
            Ok(Ok(bytes)) => {
                state.captured = Some(bytes.clone());
                Ok(bytes)
            }
            Ok(Err(e)) => {
                state.captured = Some(Vec::new());
                Err(e)
            }
            Err(e) => {
                state.captured = Some(Vec::new());
                Err(Error::Session(format!("CPU report task failed: {e}")))
            }
        }
    }

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

fn encode_report(guard: &ProfilerGuard<'static>) -> Result<Vec<u8>> {
    let report = guard
        .report()
        .build()
        .map_err(|e| Error::Session(format!("failed to build CPU report: {e}")))?;

    let profile = report
        .pprof()
        .map_err(|e| Error::Session(format!("failed to convert CPU report: {e}")))?;

    let mut buf = Vec::new();
    profile
        .encode(&mut buf)
        .map_err(|e| Error::Session(format!("failed to encode CPU profile: {e}")))?;

    Ok(buf)
}
