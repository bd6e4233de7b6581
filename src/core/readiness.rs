//! # Readiness: when is a started backend ready for players?
//!
//! The stock signal is a log-scan heuristic: the backend is ready once one
//! of four literal markers shows up in its recent output. The heuristic is
//! brittle by nature, so it sits behind the [`ReadinessProbe`] trait —
//! alternative signals (a health port, an IPC message from the bridge
//! plugin) can be substituted without disturbing the supervisor.
//!
//! ## Scanner
//! [`wait_until_ready`] polls every 500 ms until the configured deadline:
//! - process dead → error, instance marked `Failed` by the caller
//! - marker seen → ready
//! - deadline with the process alive → ready with a warning (assumed ready)
//! - deadline with the process dead → error

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{OrchestratorError, Result};
use crate::process::ProcessHandle;

/// Poll interval of the readiness scanner.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How much recent output each poll inspects.
const SCAN_WINDOW: usize = 50;
/// Literal markers that announce a ready backend.
const READY_MARKERS: [&str; 4] = ["Server started", "Done", "Ready", "Listening on"];

/// Decides whether a starting backend is ready to accept players.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// One readiness check against the given process.
    async fn poll(&self, handle: &ProcessHandle) -> bool;
}

/// The stock probe: scan the last 50 captured log lines for any of the
/// ready markers.
pub struct LogScanProbe;

#[async_trait]
impl ReadinessProbe for LogScanProbe {
    async fn poll(&self, handle: &ProcessHandle) -> bool {
        handle
            .recent_logs(SCAN_WINDOW)
            .iter()
            .any(|line| READY_MARKERS.iter().any(|marker| line.contains(marker)))
    }
}

/// Runs the readiness scan for a starting instance.
///
/// Returns `Ok(())` once the probe fires or the deadline elapses with the
/// process still alive; errors when the process dies first.
pub async fn wait_until_ready(
    server_id: &str,
    handle: &Arc<ProcessHandle>,
    probe: &dyn ReadinessProbe,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if !handle.is_alive() {
            return Err(OrchestratorError::ExitedDuringStartup {
                server_id: server_id.to_string(),
            });
        }
        if probe.poll(handle).await {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    if handle.is_alive() {
        warn!(server = %server_id, "startup timeout, assuming ready");
        Ok(())
    } else {
        Err(OrchestratorError::StartupTimeout {
            server_id: server_id.to_string(),
            timeout,
        })
    }
}
