//! # Instance classification: kind and lifecycle status.
//!
//! [`ServerKind`] distinguishes persistent (static) from ephemeral (dynamic)
//! instances. [`ServerStatus`] is the per-instance state machine:
//!
//! ```text
//! Created → Starting → Running ⇄ Unhealthy
//!               │         │
//!               ▼         ▼
//!            Failed    Stopping → Stopped
//! ```
//!
//! ## Rules
//! - `Stopped` and `Failed` are **terminal** (absorbing, enforced by
//!   [`ServerInstance`](crate::instance::ServerInstance)'s mark-methods).
//! - The predicates are total matches over the state set, so adding a state
//!   without classifying it is a compile error.

/// Whether an instance is persistent or ephemeral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKind {
    /// Working directory pre-exists and is preserved across the lifecycle.
    Static,
    /// Working directory is cloned from a template and deleted on shutdown.
    Dynamic,
}

impl ServerKind {
    /// Returns the log sub-directory name for this kind.
    pub fn log_dir(&self) -> &'static str {
        match self {
            ServerKind::Static => "static",
            ServerKind::Dynamic => "dynamic",
        }
    }
}

impl std::fmt::Display for ServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerKind::Static => write!(f, "STATIC"),
            ServerKind::Dynamic => write!(f, "DYNAMIC"),
        }
    }
}

/// Lifecycle status of a managed server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerStatus {
    /// Instance has been created but not yet started.
    Created,
    /// Server process is starting up.
    Starting,
    /// Server is running and accepting connections.
    Running,
    /// Server is in the process of shutting down.
    Stopping,
    /// Server has stopped and its process has terminated.
    Stopped,
    /// Server failed to start or crashed unexpectedly.
    Failed,
    /// Server is not responding to health checks.
    Unhealthy,
}

impl ServerStatus {
    /// True if the instance cannot transition to another state.
    pub fn is_terminal(&self) -> bool {
        match self {
            ServerStatus::Stopped | ServerStatus::Failed => true,
            ServerStatus::Created
            | ServerStatus::Starting
            | ServerStatus::Running
            | ServerStatus::Stopping
            | ServerStatus::Unhealthy => false,
        }
    }

    /// True if players can be routed to an instance in this state.
    pub fn is_accepting_players(&self) -> bool {
        match self {
            ServerStatus::Running => true,
            ServerStatus::Created
            | ServerStatus::Starting
            | ServerStatus::Stopping
            | ServerStatus::Stopped
            | ServerStatus::Failed
            | ServerStatus::Unhealthy => false,
        }
    }

    /// True if the OS process is expected to be alive in this state.
    pub fn is_process_expected(&self) -> bool {
        match self {
            ServerStatus::Starting
            | ServerStatus::Running
            | ServerStatus::Stopping
            | ServerStatus::Unhealthy => true,
            ServerStatus::Created | ServerStatus::Stopped | ServerStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerStatus::Created => "CREATED",
            ServerStatus::Starting => "STARTING",
            ServerStatus::Running => "RUNNING",
            ServerStatus::Stopping => "STOPPING",
            ServerStatus::Stopped => "STOPPED",
            ServerStatus::Failed => "FAILED",
            ServerStatus::Unhealthy => "UNHEALTHY",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_exactly_stopped_and_failed() {
        let all = [
            ServerStatus::Created,
            ServerStatus::Starting,
            ServerStatus::Running,
            ServerStatus::Stopping,
            ServerStatus::Stopped,
            ServerStatus::Failed,
            ServerStatus::Unhealthy,
        ];
        let terminal: Vec<_> = all.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![&ServerStatus::Stopped, &ServerStatus::Failed]);
    }

    #[test]
    fn only_running_accepts_players() {
        assert!(ServerStatus::Running.is_accepting_players());
        assert!(!ServerStatus::Unhealthy.is_accepting_players());
        assert!(!ServerStatus::Starting.is_accepting_players());
    }

    #[test]
    fn process_expected_matches_live_states() {
        assert!(ServerStatus::Starting.is_process_expected());
        assert!(ServerStatus::Running.is_process_expected());
        assert!(ServerStatus::Stopping.is_process_expected());
        assert!(ServerStatus::Unhealthy.is_process_expected());
        assert!(!ServerStatus::Created.is_process_expected());
        assert!(!ServerStatus::Stopped.is_process_expected());
        assert!(!ServerStatus::Failed.is_process_expected());
    }
}
