//! # Handle to a managed server process.
//!
//! Wraps a [`tokio::process::Child`] with the metadata the orchestrator
//! tracks per child: log file, bounded in-memory log buffer, start instant,
//! and the latched exit code.
//!
//! ## Rules
//! - The log buffer holds at most 1000 lines; the oldest line is evicted
//!   first (single producer, many snapshot readers).
//! - The exit code is **monotonic**: once latched it never changes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::process::Child;

/// Upper bound of buffered log lines per process.
const MAX_LOG_BUFFER: usize = 1000;

/// Point-in-time resource metrics for a live process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessMetrics {
    /// OS process identifier.
    pub pid: u32,
    /// Spawn time, milliseconds since the epoch.
    pub start_ms: u64,
    /// Milliseconds since spawn.
    pub uptime_ms: u64,
    /// Total CPU time, when the platform exposes it.
    pub cpu_ms: Option<u64>,
    /// Resident memory, when the platform exposes it.
    pub memory_bytes: Option<u64>,
}

/// A managed server process.
#[derive(Debug)]
pub struct ProcessHandle {
    server_id: String,
    pid: u32,
    working_dir: PathBuf,
    log_file: PathBuf,
    started_at: Instant,
    started_at_wall: SystemTime,
    pub(crate) child: tokio::sync::Mutex<Child>,
    log_buffer: Mutex<VecDeque<String>>,
    exit_code: Mutex<Option<i32>>,
}

impl ProcessHandle {
    /// Wraps a freshly spawned child.
    pub(crate) fn new(
        server_id: impl Into<String>,
        pid: u32,
        child: Child,
        working_dir: PathBuf,
        log_file: PathBuf,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            pid,
            working_dir,
            log_file,
            started_at: Instant::now(),
            started_at_wall: SystemTime::now(),
            child: tokio::sync::Mutex::new(child),
            log_buffer: Mutex::new(VecDeque::with_capacity(256)),
            exit_code: Mutex::new(None),
        }
    }

    /// Server identifier this process belongs to.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// OS process identifier.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Working directory the child was started in.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Path of the captured log file.
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Time since spawn.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The latched exit code, if the child has terminated.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Latches the exit code. The first write wins.
    pub(crate) fn set_exit_code(&self, code: i32) {
        let mut slot = self.exit_code.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(code);
        }
    }

    /// Reaps the child if it has exited, latching its exit code.
    ///
    /// Non-blocking: when the child lock is contended (a kill is in flight)
    /// the call falls back to the already-latched state.
    pub(crate) fn try_reap(&self) {
        if self.exit_code().is_some() {
            return;
        }
        if let Ok(mut child) = self.child.try_lock() {
            if let Ok(Some(status)) = child.try_wait() {
                self.set_exit_code(status.code().unwrap_or(-1));
            }
        }
    }

    /// True while the child process is running.
    pub fn is_alive(&self) -> bool {
        self.try_reap();
        self.exit_code().is_none()
    }

    /// Appends a captured output line, evicting the oldest beyond capacity.
    pub(crate) fn push_line(&self, line: String) {
        let mut buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_back(line);
        while buffer.len() > MAX_LOG_BUFFER {
            buffer.pop_front();
        }
    }

    /// The most recent `count` captured lines, oldest first.
    pub fn recent_logs(&self, count: usize) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        let buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());
        let skip = buffer.len().saturating_sub(count);
        buffer.iter().skip(skip).cloned().collect()
    }

    /// Every buffered line, oldest first.
    pub fn all_logs(&self) -> Vec<String> {
        let buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.iter().cloned().collect()
    }

    /// Drops all buffered lines.
    pub fn clear_log_buffer(&self) {
        self.log_buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Point-in-time metrics snapshot.
    pub fn metrics(&self) -> ProcessMetrics {
        ProcessMetrics {
            pid: self.pid,
            start_ms: self
                .started_at_wall
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            uptime_ms: self.uptime().as_millis() as u64,
            cpu_ms: None,
            memory_bytes: None,
        }
    }
}

impl std::fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ProcessHandle{{server_id={}, pid={}, alive={}, uptime={:?}}}",
            self.server_id,
            self.pid,
            self.is_alive(),
            self.uptime()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_handle() -> ProcessHandle {
        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id().expect("child pid");
        ProcessHandle::new("test", pid, child, PathBuf::from("."), PathBuf::from("test.log"))
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_first() {
        let handle = dummy_handle();
        for i in 0..(MAX_LOG_BUFFER + 5) {
            handle.push_line(format!("line-{i}"));
        }
        let all = handle.all_logs();
        assert_eq!(all.len(), MAX_LOG_BUFFER);
        assert_eq!(all.first().map(String::as_str), Some("line-5"));

        let tail = handle.recent_logs(2);
        assert_eq!(tail, vec!["line-1003".to_string(), "line-1004".to_string()]);

        handle.clear_log_buffer();
        assert!(handle.all_logs().is_empty());

        handle.child.lock().await.kill().await.ok();
    }

    #[tokio::test]
    async fn exit_code_latches_once() {
        let handle = dummy_handle();
        assert_eq!(handle.exit_code(), None);
        handle.set_exit_code(3);
        handle.set_exit_code(7);
        assert_eq!(handle.exit_code(), Some(3));
        assert!(!handle.is_alive());

        handle.child.lock().await.kill().await.ok();
    }

    #[tokio::test]
    async fn reaps_exited_child() {
        let child = tokio::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let pid = child.id().expect("child pid");
        let handle =
            ProcessHandle::new("short", pid, child, PathBuf::from("."), PathBuf::from("t.log"));

        // Give the child a moment to exit, then observe via is_alive().
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_alive());
        assert_eq!(handle.exit_code(), Some(0));
    }
}
