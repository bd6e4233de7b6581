//! # A managed server instance.
//!
//! [`ServerInstance`] tracks one backend server's lifecycle, process handle,
//! player occupancy, and health state.
//!
//! ## Rules
//! - All mutable fields live behind **one** lock, so state transitions are
//!   totally ordered and readers observe a monotonic progression toward a
//!   terminal state.
//! - `Stopped` and `Failed` are absorbing: every mark-method is a no-op once
//!   the instance is terminal.
//! - `mark_starting` is the only way a process handle gets attached, which
//!   keeps "process expected ⇒ handle present" true by construction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use dashmap::{DashMap, DashSet};
use serde_json::Value;
use uuid::Uuid;

use crate::instance::status::{ServerKind, ServerStatus};
use crate::process::ProcessHandle;
use crate::template::Template;

/// Options for spawning a dynamic server.
///
/// ## Example
/// ```
/// use fleetvisor::SpawnOptions;
///
/// let opts = SpawnOptions::new()
///     .with_max_players(8)
///     .with_memory("4G")
///     .with_metadata("gameMode", serde_json::json!("ranked"));
/// assert_eq!(opts.max_players, Some(8));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Explicit server id; generated from the template prefix when absent.
    pub server_id: Option<String>,
    /// Player capacity override.
    pub max_players: Option<u32>,
    /// JVM heap override, e.g. "4G".
    pub memory: Option<String>,
    /// Opaque metadata copied onto the instance.
    pub metadata: HashMap<String, Value>,
}

impl SpawnOptions {
    /// Creates empty options; every field falls back to template defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a specific server id.
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// Overrides the player capacity.
    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = Some(max_players);
        self
    }

    /// Overrides the JVM heap size.
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = Some(memory.into());
        self
    }

    /// Attaches one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Mutable lifecycle state, all behind one lock.
#[derive(Debug)]
struct LifecycleState {
    status: ServerStatus,
    process: Option<Arc<ProcessHandle>>,
    started_at: Option<SystemTime>,
    stopped_at: Option<SystemTime>,
    last_heartbeat: Option<SystemTime>,
    stop_reason: Option<String>,
}

/// A running (or starting, or stopped) server instance.
#[derive(Debug)]
pub struct ServerInstance {
    server_id: String,
    kind: ServerKind,
    working_dir: PathBuf,
    port: u16,
    max_players: u32,
    template: Option<Arc<Template>>,
    created_at: SystemTime,
    state: RwLock<LifecycleState>,
    players: DashSet<Uuid>,
    metadata: DashMap<String, Value>,
}

impl ServerInstance {
    /// Creates an instance in `Created` state.
    pub fn new(
        server_id: impl Into<String>,
        kind: ServerKind,
        working_dir: PathBuf,
        port: u16,
        max_players: u32,
        template: Option<Arc<Template>>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            kind,
            working_dir,
            port,
            max_players,
            template,
            created_at: SystemTime::now(),
            state: RwLock::new(LifecycleState {
                status: ServerStatus::Created,
                process: None,
                started_at: None,
                stopped_at: None,
                last_heartbeat: None,
                stop_reason: None,
            }),
            players: DashSet::new(),
            metadata: DashMap::new(),
        }
    }

    // ---- lifecycle transitions ----

    /// Attaches the process handle and moves to `Starting`.
    pub fn mark_starting(&self, process: Arc<ProcessHandle>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_terminal() {
            return;
        }
        state.process = Some(process);
        state.status = ServerStatus::Starting;
        state.started_at = Some(SystemTime::now());
    }

    /// Moves to `Running` and seeds the heartbeat. Returns the previous
    /// status, or `None` when the instance was already terminal.
    pub fn mark_running(&self) -> Option<ServerStatus> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_terminal() {
            return None;
        }
        let previous = state.status;
        state.status = ServerStatus::Running;
        state.last_heartbeat = Some(SystemTime::now());
        Some(previous)
    }

    /// Moves to `Stopping` with the given reason.
    pub fn mark_stopping(&self, reason: impl Into<String>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_terminal() {
            return;
        }
        state.status = ServerStatus::Stopping;
        state.stop_reason = Some(reason.into());
    }

    /// Moves to the terminal `Stopped` state.
    pub fn mark_stopped(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_terminal() {
            return;
        }
        state.status = ServerStatus::Stopped;
        state.stopped_at = Some(SystemTime::now());
    }

    /// Moves to the terminal `Failed` state with the given reason.
    /// Returns the previous status, or `None` when already terminal.
    pub fn mark_failed(&self, reason: impl Into<String>) -> Option<ServerStatus> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_terminal() {
            return None;
        }
        let previous = state.status;
        state.status = ServerStatus::Failed;
        state.stop_reason = Some(reason.into());
        state.stopped_at = Some(SystemTime::now());
        Some(previous)
    }

    /// Moves to `Unhealthy`. Returns the previous status, or `None` when the
    /// instance was terminal or already unhealthy.
    pub fn mark_unhealthy(&self) -> Option<ServerStatus> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_terminal() || state.status == ServerStatus::Unhealthy {
            return None;
        }
        let previous = state.status;
        state.status = ServerStatus::Unhealthy;
        Some(previous)
    }

    /// Records a heartbeat from the bridge plugin inside the child.
    ///
    /// Returns `true` when the heartbeat recovered the instance from
    /// `Unhealthy` back to `Running`.
    pub fn on_heartbeat(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.status.is_terminal() {
            return false;
        }
        state.last_heartbeat = Some(SystemTime::now());
        if state.status == ServerStatus::Unhealthy {
            state.status = ServerStatus::Running;
            return true;
        }
        false
    }

    // ---- players ----

    /// Adds a connected player.
    pub fn add_player(&self, player: Uuid) {
        self.players.insert(player);
    }

    /// Removes a connected player.
    pub fn remove_player(&self, player: Uuid) {
        self.players.remove(&player);
    }

    /// True if the player is connected.
    pub fn has_player(&self, player: Uuid) -> bool {
        self.players.contains(&player)
    }

    /// Number of connected players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Snapshot of connected player ids.
    pub fn players(&self) -> Vec<Uuid> {
        self.players.iter().map(|p| *p).collect()
    }

    /// True when the instance is at capacity.
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    // ---- metadata ----

    /// Sets a metadata value; a `Null` value removes the key.
    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.metadata.remove(&key);
        } else {
            self.metadata.insert(key, value);
        }
    }

    /// Reads a metadata value.
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.get(key).map(|v| v.clone())
    }

    /// Snapshot of the whole metadata bag.
    pub fn metadata_all(&self) -> HashMap<String, Value> {
        self.metadata
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    // ---- status checks ----

    /// Current lifecycle status.
    pub fn status(&self) -> ServerStatus {
        self.state.read().unwrap_or_else(|e| e.into_inner()).status
    }

    /// True if the instance is starting or running with a live process.
    pub fn is_healthy(&self) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if !matches!(state.status, ServerStatus::Running | ServerStatus::Starting) {
            return false;
        }
        state.process.as_ref().is_some_and(|p| p.is_alive())
    }

    /// True if players can be routed here right now.
    pub fn is_accepting_players(&self) -> bool {
        self.status().is_accepting_players() && !self.is_full()
    }

    /// True for dynamic instances.
    pub fn is_dynamic(&self) -> bool {
        self.kind == ServerKind::Dynamic
    }

    /// True for static instances.
    pub fn is_static(&self) -> bool {
        self.kind == ServerKind::Static
    }

    // ---- accessors ----

    /// Server identifier.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Static or dynamic.
    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    /// Working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Player capacity.
    pub fn max_players(&self) -> u32 {
        self.max_players
    }

    /// Originating template, for dynamic instances.
    pub fn template(&self) -> Option<Arc<Template>> {
        self.template.clone()
    }

    /// Attached process handle, once `Starting`.
    pub fn process(&self) -> Option<Arc<ProcessHandle>> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .process
            .clone()
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Start timestamp, once `Starting`.
    pub fn started_at(&self) -> Option<SystemTime> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).started_at
    }

    /// Stop timestamp, once terminal.
    pub fn stopped_at(&self) -> Option<SystemTime> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).stopped_at
    }

    /// Timestamp of the last heartbeat, seeded when the instance turns
    /// `Running`.
    pub fn last_heartbeat(&self) -> Option<SystemTime> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last_heartbeat
    }

    /// Stop or failure reason, once set.
    pub fn stop_reason(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .stop_reason
            .clone()
    }

    /// Time between start and stop (or now, while live).
    pub fn uptime(&self) -> Duration {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let Some(started) = state.started_at else {
            return Duration::ZERO;
        };
        let end = state.stopped_at.unwrap_or_else(SystemTime::now);
        end.duration_since(started).unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Display for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ServerInstance{{id={}, kind={}, status={}, port={}, players={}/{}}}",
            self.server_id,
            self.kind,
            self.status(),
            self.port,
            self.player_count(),
            self.max_players
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ServerInstance {
        ServerInstance::new(
            "lobby",
            ServerKind::Static,
            PathBuf::from("servers/static/lobby"),
            6000,
            2,
            None,
        )
    }

    #[test]
    fn created_instance_has_no_timestamps() {
        let i = instance();
        assert_eq!(i.status(), ServerStatus::Created);
        assert!(i.started_at().is_none());
        assert!(i.stopped_at().is_none());
        assert!(i.process().is_none());
    }

    #[test]
    fn terminal_states_absorb_transitions() {
        let i = instance();
        i.mark_failed("boom");
        assert_eq!(i.status(), ServerStatus::Failed);
        assert!(i.stopped_at().is_some());

        i.mark_stopping("late");
        i.mark_stopped();
        assert!(i.mark_running().is_none());
        assert!(i.mark_unhealthy().is_none());
        assert!(!i.on_heartbeat());
        assert_eq!(i.status(), ServerStatus::Failed);
        assert_eq!(i.stop_reason().as_deref(), Some("boom"));
    }

    #[test]
    fn heartbeat_recovers_unhealthy_instance() {
        let i = instance();
        assert_eq!(i.mark_running(), Some(ServerStatus::Created));
        assert_eq!(i.mark_unhealthy(), Some(ServerStatus::Running));
        assert!(i.last_heartbeat().is_some());

        assert!(i.on_heartbeat());
        assert_eq!(i.status(), ServerStatus::Running);
        // A second heartbeat is not a recovery.
        assert!(!i.on_heartbeat());
    }

    #[test]
    fn unhealthy_is_not_reentrant() {
        let i = instance();
        i.mark_running();
        assert!(i.mark_unhealthy().is_some());
        assert!(i.mark_unhealthy().is_none());
    }

    #[test]
    fn capacity_gates_player_admission() {
        let i = instance();
        i.mark_running();
        assert!(i.is_accepting_players());

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        i.add_player(a);
        i.add_player(b);
        assert!(i.is_full());
        assert!(!i.is_accepting_players());
        assert!(i.has_player(a));

        i.remove_player(a);
        assert_eq!(i.player_count(), 1);
        assert!(i.is_accepting_players());
    }

    #[test]
    fn null_metadata_removes_key() {
        let i = instance();
        i.set_metadata("mode", serde_json::json!("ranked"));
        assert_eq!(i.metadata("mode"), Some(serde_json::json!("ranked")));
        i.set_metadata("mode", Value::Null);
        assert_eq!(i.metadata("mode"), None);
        assert!(i.metadata_all().is_empty());
    }
}
