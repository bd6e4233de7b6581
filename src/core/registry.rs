//! # Server registry: in-memory index of live instances.
//!
//! Two maps — `server_id → instance` and `port → server_id` — mutated under
//! one commit lock so they can never disagree, read lock-free.
//!
//! ## Rules
//! - `register` rejects a duplicate id or a duplicate port.
//! - `unregister` clears both maps.
//! - Queries are snapshots; they never block registration.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use crate::error::{OrchestratorError, Result};
use crate::instance::{ServerInstance, ServerKind, ServerStatus};

/// Aggregate registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// All registered instances.
    pub total: usize,
    /// Static instances.
    pub static_servers: usize,
    /// Dynamic instances.
    pub dynamic_servers: usize,
    /// Instances currently `Running`.
    pub running: usize,
    /// Connected players across all instances.
    pub players: usize,
}

/// Index of live instances by identifier and by port.
pub struct Registry {
    servers: DashMap<String, Arc<ServerInstance>>,
    port_to_server: DashMap<u16, String>,
    // Guards dual-map mutation; reads stay lock-free.
    commit: Mutex<()>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            servers: DashMap::new(),
            port_to_server: DashMap::new(),
            commit: Mutex::new(()),
        }
    }

    /// Registers an instance, enforcing id and port uniqueness.
    pub fn register(&self, instance: Arc<ServerInstance>) -> Result<()> {
        let _guard = self.commit.lock().unwrap_or_else(|e| e.into_inner());

        let server_id = instance.server_id().to_string();
        let port = instance.port();

        if self.servers.contains_key(&server_id) {
            return Err(OrchestratorError::ServerAlreadyExists { server_id });
        }
        if self.port_to_server.contains_key(&port) {
            return Err(OrchestratorError::PortInUse { port });
        }

        self.servers.insert(server_id.clone(), instance);
        self.port_to_server.insert(port, server_id.clone());
        debug!(server = %server_id, port, "registered server");
        Ok(())
    }

    /// Unregisters an instance, clearing both maps.
    ///
    /// Returns the removed instance, or `None` when the id was unknown.
    pub fn unregister(&self, server_id: &str) -> Option<Arc<ServerInstance>> {
        let _guard = self.commit.lock().unwrap_or_else(|e| e.into_inner());

        let (_, instance) = self.servers.remove(server_id)?;
        self.port_to_server.remove(&instance.port());
        debug!(server = %server_id, "unregistered server");
        Some(instance)
    }

    /// Looks up an instance by id.
    pub fn by_id(&self, server_id: &str) -> Option<Arc<ServerInstance>> {
        self.servers.get(server_id).map(|i| Arc::clone(&i))
    }

    /// Looks up an instance by port.
    pub fn by_port(&self, port: u16) -> Option<Arc<ServerInstance>> {
        let server_id = self.port_to_server.get(&port)?.clone();
        self.by_id(&server_id)
    }

    /// True if an instance with the id is registered.
    pub fn contains(&self, server_id: &str) -> bool {
        self.servers.contains_key(server_id)
    }

    /// True if the port belongs to a registered instance.
    pub fn is_port_in_use(&self, port: u16) -> bool {
        self.port_to_server.contains_key(&port)
    }

    /// All registered instances.
    pub fn servers(&self) -> Vec<Arc<ServerInstance>> {
        self.servers.iter().map(|i| Arc::clone(&i)).collect()
    }

    /// All registered ids, sorted.
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.iter().map(|i| i.key().clone()).collect();
        ids.sort_unstable();
        ids
    }

    /// Instances of the given kind.
    pub fn by_kind(&self, kind: ServerKind) -> Vec<Arc<ServerInstance>> {
        self.filter(|i| i.kind() == kind)
    }

    /// Instances in the given status.
    pub fn by_status(&self, status: ServerStatus) -> Vec<Arc<ServerInstance>> {
        self.filter(|i| i.status() == status)
    }

    /// Instances matching an arbitrary predicate.
    pub fn filter(&self, predicate: impl Fn(&ServerInstance) -> bool) -> Vec<Arc<ServerInstance>> {
        self.servers
            .iter()
            .filter(|i| predicate(i.value()))
            .map(|i| Arc::clone(&i))
            .collect()
    }

    /// Static instances.
    pub fn static_servers(&self) -> Vec<Arc<ServerInstance>> {
        self.by_kind(ServerKind::Static)
    }

    /// Dynamic instances.
    pub fn dynamic_servers(&self) -> Vec<Arc<ServerInstance>> {
        self.by_kind(ServerKind::Dynamic)
    }

    /// Running instances with spare capacity.
    pub fn available_servers(&self) -> Vec<Arc<ServerInstance>> {
        self.filter(|i| i.is_accepting_players())
    }

    /// Picks the best instance to route a player to: running, not full,
    /// optionally restricted to a template, fewest players first, smallest
    /// id on ties.
    pub fn find_available(&self, template_name: Option<&str>) -> Option<Arc<ServerInstance>> {
        self.servers
            .iter()
            .filter(|i| i.is_accepting_players())
            .filter(|i| match template_name {
                None => true,
                Some(name) => i
                    .template()
                    .is_some_and(|t| t.name().eq_ignore_ascii_case(name)),
            })
            .min_by_key(|i| (i.player_count(), i.server_id().to_string()))
            .map(|i| Arc::clone(&i))
    }

    /// Total connected players.
    pub fn total_players(&self) -> usize {
        self.servers.iter().map(|i| i.player_count()).sum()
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Aggregate counters.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: 0,
            static_servers: 0,
            dynamic_servers: 0,
            running: 0,
            players: 0,
        };
        for entry in self.servers.iter() {
            stats.total += 1;
            match entry.kind() {
                ServerKind::Static => stats.static_servers += 1,
                ServerKind::Dynamic => stats.dynamic_servers += 1,
            }
            if entry.status() == ServerStatus::Running {
                stats.running += 1;
            }
            stats.players += entry.player_count();
        }
        stats
    }

    /// Drops every registration.
    pub fn clear(&self) {
        let _guard = self.commit.lock().unwrap_or_else(|e| e.into_inner());
        self.servers.clear();
        self.port_to_server.clear();
        debug!("registry cleared");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn make(id: &str, port: u16, max_players: u32) -> Arc<ServerInstance> {
        Arc::new(ServerInstance::new(
            id,
            ServerKind::Dynamic,
            PathBuf::from(format!("servers/dynamic/{id}")),
            port,
            max_players,
            None,
        ))
    }

    #[test]
    fn duplicate_id_and_port_are_rejected() {
        let reg = Registry::new();
        reg.register(make("a", 6100, 16)).unwrap();

        let dup_id = reg.register(make("a", 6101, 16)).unwrap_err();
        assert_eq!(dup_id.as_label(), "server_already_exists");

        let dup_port = reg.register(make("b", 6100, 16)).unwrap_err();
        assert_eq!(dup_port.as_label(), "port_in_use");

        assert_eq!(reg.len(), 1);
        assert!(reg.is_port_in_use(6100));
        assert!(!reg.is_port_in_use(6101));
    }

    #[test]
    fn unregister_clears_both_maps() {
        let reg = Registry::new();
        reg.register(make("a", 6100, 16)).unwrap();
        assert!(reg.by_port(6100).is_some());

        let removed = reg.unregister("a").unwrap();
        assert_eq!(removed.server_id(), "a");
        assert!(reg.by_id("a").is_none());
        assert!(reg.by_port(6100).is_none());
        assert!(!reg.is_port_in_use(6100));
        assert!(reg.unregister("a").is_none());
    }

    #[test]
    fn selection_prefers_fewest_players_then_smallest_id() {
        let reg = Registry::new();
        let (a, b, c) = (
            make("alpha", 6100, 16),
            make("beta", 6101, 16),
            make("gamma", 6102, 16),
        );
        for i in [&a, &b, &c] {
            i.mark_running();
        }
        reg.register(Arc::clone(&a)).unwrap();
        reg.register(Arc::clone(&b)).unwrap();
        reg.register(Arc::clone(&c)).unwrap();

        b.add_player(Uuid::new_v4());
        // alpha and gamma are tied on zero players; smallest id wins.
        assert_eq!(reg.find_available(None).unwrap().server_id(), "alpha");

        a.add_player(Uuid::new_v4());
        a.add_player(Uuid::new_v4());
        assert_eq!(reg.find_available(None).unwrap().server_id(), "gamma");
    }

    #[test]
    fn full_or_stopped_servers_are_not_available() {
        let reg = Registry::new();
        let full = make("full", 6100, 1);
        full.mark_running();
        full.add_player(Uuid::new_v4());
        let stopped = make("stopped", 6101, 16);
        stopped.mark_running();
        stopped.mark_stopping("done");
        reg.register(full).unwrap();
        reg.register(stopped).unwrap();

        assert!(reg.find_available(None).is_none());
        assert!(reg.available_servers().is_empty());
    }

    #[test]
    fn stats_count_by_kind_and_status() {
        let reg = Registry::new();
        let running = make("run", 6100, 16);
        running.mark_running();
        running.add_player(Uuid::new_v4());
        reg.register(running).unwrap();

        let static_instance = Arc::new(ServerInstance::new(
            "lobby",
            ServerKind::Static,
            PathBuf::from("servers/static/lobby"),
            6000,
            100,
            None,
        ));
        reg.register(static_instance).unwrap();

        let stats = reg.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.static_servers, 1);
        assert_eq!(stats.dynamic_servers, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.players, 1);
        assert_eq!(reg.total_players(), 1);
    }
}
