//! Runtime task and thread dumps.
//!
//! The `goroutine` mode (also reachable under the `tasks` alias) captures a
//! point-in-time view of the process's concurrent execution units: tokio
//! runtime counters plus the kernel thread table read from
//! `/proc/self/task`. The artifact is plain text, one thread per line.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{arm_session_timer, ProfileSession, Profiler};
use crate::error::{Error, Result};
use crate::types::ProfilingTask;

/// Task/thread dump mode.
pub struct TaskDumpProfiler;

#[async_trait]
impl Profiler for TaskDumpProfiler {
    fn profile_type(&self) -> &'static str {
        "goroutine"
    }

    async fn start(&self, task: &ProfilingTask) -> Result<Arc<dyn ProfileSession>> {
        let session = Arc::new(TaskDumpSession {
            start_time: Utc::now(),
            running: AtomicBool::new(true),
            captured: Mutex::new(None),
        });

        arm_session_timer(session.clone(), task);
        Ok(session)
    }
}

struct TaskDumpSession {
    start_time: DateTime<Utc>,
    running: AtomicBool,
    captured: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl ProfileSession for TaskDumpSession {
    async fn stop(&self) -> Result<Vec<u8>> {
        let mut captured = self.captured.lock().await;

        if let Some(bytes) = &*captured {
            return Ok(bytes.clone());
        }

        self.running.store(false, Ordering::Release);

        let runtime = tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| {
                let metrics = handle.metrics();
                (metrics.num_workers(), metrics.num_alive_tasks())
            });

        let outcome = tokio::task::spawn_blocking(move || render_dump(runtime)).await;
        match outcome {
            Ok(Ok(bytes)) => {
                *captured = Some(bytes.clone());
                Ok(bytes)
            }
            Ok(Err(e)) => {
                *captured = Some(Vec::new());
                Err(e)
            }
            Err(e) => {
                *captured = Some(Vec::new());
                Err(Error::Session(format!("task dump task failed: {e}")))
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

fn render_dump(runtime: Option<(usize, usize)>) -> Result<Vec<u8>> {
    let mut out = String::new();
    let _ = writeln!(out, "captured_at: {}", Utc::now().to_rfc3339());

    if let Some((workers, alive_tasks)) = runtime {
        let _ = writeln!(out, "runtime_workers: {workers}");
        let _ = writeln!(out, "runtime_alive_tasks: {alive_tasks}");
    }

    let entries = std::fs::read_dir("/proc/self/task")
        .map_err(|e| Error::Session(format!("failed to read thread table: {e}")))?;

    let _ = writeln!(out, "threads:");
    let mut count = 0usize;
    for entry in entries.flatten() {
        let tid = entry.file_name().to_string_lossy().into_owned();
        // Threads can exit between the directory scan and these reads.
        let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };
        let state = std::fs::read_to_string(entry.path().join("stat"))
            .ok()
            .and_then(|stat| thread_state(&stat))
            .unwrap_or('?');
        let _ = writeln!(out, "  tid={tid} name={} state={state}", comm.trim());
        count += 1;
    }
    let _ = writeln!(out, "thread_count: {count}");

    Ok(out.into_bytes())
}

/// State field of `/proc/<pid>/task/<tid>/stat`, the first field after the
/// parenthesized command name (which itself may contain spaces).
fn thread_state(stat: &str) -> Option<char> {
    let after = &stat[stat.rfind(')')? + 1..];
    after.split_whitespace().next()?.chars().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn dump_task() -> ProfilingTask {
        ProfilingTask {
            path: "/busy/:id".to_string(),
            methods: vec!["GET".to_string()],
            expires_at: Utc::now() + TimeDelta::hours(1),
            duration: 30,
            sample_rate: 1,
            profile_type: "goroutine".to_string(),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_task_dump_lists_threads() {
        let profiler = TaskDumpProfiler;
        let session = profiler.start(&dump_task()).await.expect("start dump session");

        let bytes = session.stop().await.expect("stop dump session");
        let text = String::from_utf8(bytes.clone()).expect("dump is utf-8");
        assert!(text.contains("threads:"));
        assert!(text.contains("tid="));
        assert!(text.contains("runtime_workers:"));

        let again = session.stop().await.expect("second stop");
        assert_eq!(bytes, again);
    }

    #[test]
    fn test_thread_state_parsing() {
        let stat = "12345 (tokio-runtime-w) S 1 12345 12345 0 -1";
        assert_eq!(thread_state(stat), Some('S'));

        let weird = "1 (a name) with) parens) R 0 0";
        assert_eq!(thread_state(weird), Some('R'));
    }
}
