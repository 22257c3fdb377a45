//! Heap profiling backed by jemalloc's allocation profiler.
//!
//! Nothing is sampled between start and stop; the session's duration timer
//! merely defers the snapshot so the artifact approximates the task's window.
//! The host process must run with jemalloc as its global allocator and
//! profiling activated (`MALLOC_CONF=prof:true,prof_active:true`); otherwise
//! capturing fails and the coordinator counts the failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{arm_session_timer, ProfileSession, Profiler};
use crate::error::{Error, Result};
use crate::types::ProfilingTask;

/// Heap snapshot mode.
pub struct HeapProfiler;

#[async_trait]
impl Profiler for HeapProfiler {
    fn profile_type(&self) -> &'static str {
        "heap"
    }

    async fn start(&self, task: &ProfilingTask) -> Result<Arc<dyn ProfileSession>> {
        let session = Arc::new(HeapSession {
            start_time: Utc::now(),
            running: AtomicBool::new(true),
            captured: Mutex::new(None),
        });

        arm_session_timer(session.clone(), task);
        Ok(session)
    }
}

struct HeapSession {
    start_time: DateTime<Utc>,
    running: AtomicBool,
    captured: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl ProfileSession for HeapSession {
    async fn stop(&self) -> Result<Vec<u8>> {
        let mut captured = self.captured.lock().await;

        if let Some(bytes) = &*captured {
            return Ok(bytes.clone());
        }

        self.running.store(false, Ordering::Release);

        let outcome = dump_heap_profile().await;
        match outcome {
            Ok(bytes) => {
                *captured = Some(bytes.clone());
                Ok(bytes)
            }
            Err(e) => {
                *captured = Some(Vec::new());
                Err(e)
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

/// Snapshot the jemalloc allocation profile as gzipped pprof bytes.
async fn dump_heap_profile() -> Result<Vec<u8>> {
    let Some(prof_ctl) = jemalloc_pprof::PROF_CTL.as_ref() else {
        return Err(Error::Session(
            "jemalloc heap profiling is not available in this process".to_string(),
        ));
    };

    let mut prof_ctl = prof_ctl.lock().await;
    if !prof_ctl.activated() {
        return Err(Error::Session(
            "jemalloc heap profiling is not activated (set MALLOC_CONF=prof:true,prof_active:true)"
                .to_string(),
        ));
    }

    prof_ctl
        .dump_pprof()
        .map_err(|e| Error::Session(format!("failed to dump heap profile: {e}")))
}
