//! # Lifecycle events emitted by the orchestrator.
//!
//! The [`EventKind`] enum classifies the three event families:
//! - **ServerSpawn**: an instance was spawned and committed to the registry
//! - **ServerShutdown**: an instance is being torn down (with a [`ShutdownReason`])
//! - **ServerHealth**: an instance's health status changed
//!
//! The [`Event`] struct carries the stable payload fields of each family as
//! optional metadata attached with builder methods.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Events emitted for a single server observe the order of
//! the triggering transactions' commits.
//!
//! ## Example
//! ```rust
//! use fleetvisor::{Event, EventKind, ServerKind};
//!
//! let ev = Event::now(EventKind::ServerSpawn, "bedwars-1")
//!     .with_server_kind(ServerKind::Dynamic)
//!     .with_port(6100)
//!     .with_template("bedwars");
//!
//! assert_eq!(ev.kind, EventKind::ServerSpawn);
//! assert_eq!(ev.port, Some(6100));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::instance::{ServerKind, ServerStatus};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An instance was spawned, passed readiness, and was registered.
    ServerSpawn,
    /// An instance is being torn down.
    ServerShutdown,
    /// An instance's health status changed.
    ServerHealth,
}

/// Why an instance is being shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Requested by an operator.
    AdminRequest,
    /// Game/match ended normally.
    GameEnded,
    /// Server process crashed.
    ProcessCrashed,
    /// Health surveillance gave up on the instance.
    HealthCheckFailed,
    /// The proxy itself is shutting down.
    ProxyShutdown,
    /// Auto-cleanup after an idle timeout.
    AutoCleanup,
    /// Unknown or unspecified reason.
    Unknown,
}

impl ShutdownReason {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ShutdownReason::AdminRequest => "admin_request",
            ShutdownReason::GameEnded => "game_ended",
            ShutdownReason::ProcessCrashed => "process_crashed",
            ShutdownReason::HealthCheckFailed => "health_check_failed",
            ShutdownReason::ProxyShutdown => "proxy_shutdown",
            ShutdownReason::AutoCleanup => "auto_cleanup",
            ShutdownReason::Unknown => "unknown",
        }
    }
}

/// Lifecycle event with optional payload metadata.
///
/// ## Fields
/// - `seq`: Unique sequence number for ordering (monotonically increasing)
/// - `at`: Wall-clock timestamp (may go backwards due to NTP, use for logging only)
/// - `kind`: Event classification
/// - `server_id`: The instance the event concerns
/// - `server_kind`, `port`, `template`: spawn payload
/// - `reason`, `forced`: shutdown payload
/// - `previous`, `current`, `message`: health payload
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Identifier of the instance this event concerns.
    pub server_id: String,
    /// Static or dynamic (spawn events).
    pub server_kind: Option<ServerKind>,
    /// Listening port (spawn events).
    pub port: Option<u16>,
    /// Originating template name (dynamic spawn events).
    pub template: Option<String>,
    /// Why the instance is going away (shutdown events).
    pub reason: Option<ShutdownReason>,
    /// Whether the shutdown skips the graceful path (shutdown events).
    pub forced: Option<bool>,
    /// Status before the change (health events).
    pub previous: Option<ServerStatus>,
    /// Status after the change (health events).
    pub current: Option<ServerStatus>,
    /// Human-readable detail (health events).
    pub message: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind, server_id: impl Into<String>) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            server_id: server_id.into(),
            server_kind: None,
            port: None,
            template: None,
            reason: None,
            forced: None,
            previous: None,
            current: None,
            message: None,
        }
    }

    /// Attaches the instance kind.
    pub fn with_server_kind(mut self, kind: ServerKind) -> Self {
        self.server_kind = Some(kind);
        self
    }

    /// Attaches the listening port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Attaches the originating template name.
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    /// Attaches the shutdown reason.
    pub fn with_reason(mut self, reason: ShutdownReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Attaches the forced flag.
    pub fn with_forced(mut self, forced: bool) -> Self {
        self.forced = Some(forced);
        self
    }

    /// Attaches the previous → current status pair.
    pub fn with_transition(mut self, previous: ServerStatus, current: ServerStatus) -> Self {
        self.previous = Some(previous);
        self.current = Some(current);
        self
    }

    /// Attaches a human-readable detail message.
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// True if a health event reports the instance turning unhealthy or failed.
    pub fn became_unhealthy(&self) -> bool {
        matches!(
            self.current,
            Some(ServerStatus::Unhealthy) | Some(ServerStatus::Failed)
        )
    }

    /// True if a health event reports recovery from unhealthy back to running.
    pub fn recovered(&self) -> bool {
        matches!(
            self.previous,
            Some(ServerStatus::Unhealthy) | Some(ServerStatus::Failed)
        ) && self.current == Some(ServerStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::now(EventKind::ServerSpawn, "a");
        let b = Event::now(EventKind::ServerSpawn, "b");
        assert!(b.seq > a.seq);
    }

    #[test]
    fn health_transition_predicates() {
        let down = Event::now(EventKind::ServerHealth, "lobby")
            .with_transition(ServerStatus::Running, ServerStatus::Unhealthy);
        assert!(down.became_unhealthy());
        assert!(!down.recovered());

        let up = Event::now(EventKind::ServerHealth, "lobby")
            .with_transition(ServerStatus::Unhealthy, ServerStatus::Running)
            .with_message("heartbeat received");
        assert!(up.recovered());
        assert!(!up.became_unhealthy());
    }
}
