//! # Fleet health probe.
//!
//! A single background task that ticks every
//! `health_check_interval_seconds` and sweeps the running instances:
//!
//! - process no longer alive → `Failed` ("Process died"), dynamic instances
//!   get an asynchronous forced cleanup
//! - heartbeat older than three probe intervals → `Unhealthy`
//!
//! The loop runs until its cancellation token fires.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::supervisor::InstanceSupervisor;

/// Spawns the health-probe loop for the given supervisor.
pub(crate) fn spawn_probe(supervisor: Arc<InstanceSupervisor>, token: CancellationToken) {
    let interval = supervisor.health_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a freshly booted
        // fleet gets a full interval before its first sweep.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("running fleet health checks");
                    supervisor.perform_health_checks().await;
                }
            }
        }
        debug!("health probe stopped");
    });
}
