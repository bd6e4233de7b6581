//! # Instance supervisor: lifecycle transactions for server instances.
//!
//! Owns the instance map and drives the spawn, shutdown, and cleanup
//! transactions over the process supervisor, the template store, and the
//! port allocator.
//!
//! ## Spawn-dynamic transaction
//! ```text
//! check spawning enabled ─► check concurrency ceiling ─► resolve template
//!   ─► resolve server id (caller's, else <prefix>-<counter>)
//!   ─► acquire port                    (rollback: release)
//!   ─► clone template with overrides   (rollback: delete clone)
//!   ─► spawn process                   (rollback: kill + untrack)
//!   ─► Starting, insert into map       (rollback: remove)
//!   ─► readiness scan ─► Running
//! ```
//! Every resource acquired from the port acquisition onward is released on
//! the error path; a failed spawn leaves no port, directory, process, or
//! map entry behind.
//!
//! ## Rules
//! - A single instance's transitions are totally ordered (one lock inside
//!   [`ServerInstance`]); across instances there is no ordering.
//! - `shutdown_server` of an unknown id is a benign no-op with a warning.
//! - The boot-time purge deletes every child of the dynamic root: residue
//!   from a prior process cannot be safely adopted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::config::{OrchestratorConfig, StaticServerConfig};
use crate::core::readiness::{wait_until_ready, LogScanProbe, ReadinessProbe};
use crate::error::{OrchestratorError, Result};
use crate::events::{Bus, Event, EventKind};
use crate::instance::{ServerInstance, ServerKind, ServerStatus, SpawnOptions};
use crate::ports::PortAllocator;
use crate::process::{ProcessSupervisor, SpawnCommand};
use crate::template::{
    Template, TemplateStore, OVERRIDE_MAX_PLAYERS, OVERRIDE_PORT, OVERRIDE_SERVER_ID,
};

/// Server arguments applied when neither the template nor the static config
/// declares any.
const DEFAULT_SERVER_ARGS: [&str; 6] = [
    "--assets",
    "Assets.zip",
    "--auth-mode",
    "insecure",
    "--transport",
    "QUIC",
];

/// Graceful-shutdown deadline when no template metadata is available.
const DEFAULT_GRACEFUL_DEADLINE: Duration = Duration::from_secs(30);
/// Ceiling on draining the whole fleet during supervisor shutdown.
const FLEET_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(60);

/// Resources acquired by an in-flight spawn, released in reverse on failure.
#[derive(Default)]
struct SpawnRollback {
    port: Option<u16>,
    clone_dir: Option<PathBuf>,
    process_id: Option<String>,
    instance_id: Option<String>,
}

/// Supervises instance lifecycles: spawn, readiness, health, shutdown.
pub struct InstanceSupervisor {
    config: OrchestratorConfig,
    templates: Arc<TemplateStore>,
    processes: Arc<ProcessSupervisor>,
    ports: Arc<PortAllocator>,
    bus: Bus,
    instances: DashMap<String, Arc<ServerInstance>>,
    counter: AtomicU64,
    static_root: PathBuf,
    dynamic_root: PathBuf,
    probe: Box<dyn ReadinessProbe>,
    shutting_down: AtomicBool,
}

impl InstanceSupervisor {
    /// Creates a supervisor; call [`initialize`](Self::initialize) before
    /// accepting intents.
    pub fn new(
        config: OrchestratorConfig,
        templates: Arc<TemplateStore>,
        processes: Arc<ProcessSupervisor>,
        ports: Arc<PortAllocator>,
        bus: Bus,
        static_root: impl Into<PathBuf>,
        dynamic_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            templates,
            processes,
            ports,
            bus,
            instances: DashMap::new(),
            counter: AtomicU64::new(0),
            static_root: static_root.into(),
            dynamic_root: dynamic_root.into(),
            probe: Box::new(LogScanProbe),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Replaces the readiness probe. The log-scan heuristic is the default.
    pub fn with_probe(mut self, probe: Box<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Creates the working-directory roots and purges dynamic residue left
    /// by a prior orchestrator process.
    pub fn initialize(&self) -> Result<()> {
        std::fs::create_dir_all(&self.static_root)?;
        std::fs::create_dir_all(&self.dynamic_root)?;
        self.purge_dynamic_root();
        info!("instance supervisor initialized");
        Ok(())
    }

    /// Deletes every child of the dynamic root.
    fn purge_dynamic_root(&self) {
        let entries = match std::fs::read_dir(&self.dynamic_root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to scan dynamic directory");
                return;
            }
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            info!(path = %path.display(), "cleaning up leftover dynamic server");
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "failed to clean up leftover");
            }
        }
    }

    // ---- static servers ----

    /// Starts a static server from its declared working directory.
    pub async fn start_static(
        &self,
        server_id: &str,
        static_config: &StaticServerConfig,
    ) -> Result<Arc<ServerInstance>> {
        let server_dir = self.static_root.join(server_id);
        if !server_dir.is_dir() {
            return Err(OrchestratorError::WorkingDirMissing { dir: server_dir });
        }
        if self.instances.contains_key(server_id) {
            return Err(OrchestratorError::ServerAlreadyExists {
                server_id: server_id.to_string(),
            });
        }

        let port = static_config.port;
        if !self.ports.acquire(port) {
            return Err(OrchestratorError::PortInUse { port });
        }

        let mut rollback = SpawnRollback {
            port: Some(port),
            ..SpawnRollback::default()
        };
        match self
            .start_static_inner(server_id, static_config, server_dir, port, &mut rollback)
            .await
        {
            Ok(instance) => Ok(instance),
            Err(e) => {
                error!(server = %server_id, error = %e, "failed to start static server");
                self.run_rollback(rollback).await;
                Err(e)
            }
        }
    }

    async fn start_static_inner(
        &self,
        server_id: &str,
        static_config: &StaticServerConfig,
        server_dir: PathBuf,
        port: u16,
        rollback: &mut SpawnRollback,
    ) -> Result<Arc<ServerInstance>> {
        let instance = Arc::new(ServerInstance::new(
            server_id,
            ServerKind::Static,
            server_dir.clone(),
            port,
            static_config.max_players,
            None,
        ));

        let server_args = build_server_args(&static_config.server_args, port);

        let handle = self
            .processes
            .spawn(SpawnCommand {
                server_id: server_id.to_string(),
                working_dir: server_dir,
                memory: static_config.memory.clone(),
                exec_file: None,
                jvm_args: static_config.jvm_args.clone(),
                server_args,
                environment: static_config.environment.clone(),
                kind: ServerKind::Static,
            })
            .await?;
        rollback.process_id = Some(server_id.to_string());

        instance.mark_starting(Arc::clone(&handle));
        self.instances
            .insert(server_id.to_string(), Arc::clone(&instance));
        rollback.instance_id = Some(server_id.to_string());

        self.scan_readiness(&instance, &handle).await?;

        info!(server = %server_id, port, "started static server");
        Ok(instance)
    }

    // ---- dynamic servers ----

    /// Spawns a dynamic server from a template.
    pub async fn spawn_dynamic(
        &self,
        template_name: &str,
        options: SpawnOptions,
    ) -> Result<Arc<ServerInstance>> {
        if !self.config.dynamic_spawning.enabled {
            return Err(OrchestratorError::SpawningDisabled);
        }
        let max = self.config.dynamic_spawning.max_concurrent;
        if self.dynamic_count() >= max {
            return Err(OrchestratorError::MaxConcurrentReached { max });
        }

        let template = self
            .templates
            .by_name(template_name)
            .ok_or_else(|| OrchestratorError::TemplateNotFound {
                name: template_name.to_string(),
            })?;
        let template_config = self.config.template_config(template_name);

        let server_id = match &options.server_id {
            Some(id) => id.clone(),
            None => self.generate_server_id(&template),
        };
        if self.instances.contains_key(&server_id) {
            return Err(OrchestratorError::ServerAlreadyExists { server_id });
        }

        let port = self.ports.acquire_in_range(
            template_config.port_range_start,
            template_config.port_range_end,
        )?;
        let free = self.ports.free_in_range(
            self.config.port_allocation.dynamic_range_start,
            self.config.port_allocation.dynamic_range_end,
        );
        if free < self.config.dynamic_spawning.min_available_ports {
            warn!(free, "dynamic port pool is running low");
        }

        let mut rollback = SpawnRollback {
            port: Some(port),
            ..SpawnRollback::default()
        };
        match self
            .spawn_dynamic_inner(
                &template,
                &template_config,
                server_id.clone(),
                port,
                options,
                &mut rollback,
            )
            .await
        {
            Ok(instance) => {
                info!(
                    server = %server_id,
                    template = %template.name(),
                    port,
                    "spawned dynamic server"
                );
                Ok(instance)
            }
            Err(e) => {
                error!(
                    server = %server_id,
                    template = %template_name,
                    error = %e,
                    "failed to spawn dynamic server"
                );
                self.run_rollback(rollback).await;
                Err(e)
            }
        }
    }

    async fn spawn_dynamic_inner(
        &self,
        template: &Arc<Template>,
        template_config: &crate::config::TemplateConfig,
        server_id: String,
        port: u16,
        options: SpawnOptions,
        rollback: &mut SpawnRollback,
    ) -> Result<Arc<ServerInstance>> {
        let max_players = options.max_players.unwrap_or(template_config.max_players);

        let server_dir = self.dynamic_root.join(&server_id);
        let overrides = HashMap::from([
            (OVERRIDE_PORT.to_string(), port.to_string()),
            (OVERRIDE_SERVER_ID.to_string(), server_id.clone()),
            (OVERRIDE_MAX_PLAYERS.to_string(), max_players.to_string()),
        ]);
        // clone_to is not transactional; the rollback owns partial copies.
        // A pre-existing destination is not ours to delete.
        if !server_dir.exists() {
            rollback.clone_dir = Some(server_dir.clone());
        }
        template.clone_to(&server_dir, &overrides)?;

        let mut environment = template_config.environment.clone();
        environment.insert("NUMDRASSL_SERVER_ID".to_string(), server_id.clone());
        environment.insert("NUMDRASSL_PORT".to_string(), port.to_string());
        environment.insert(
            "NUMDRASSL_TEMPLATE".to_string(),
            template.name().to_string(),
        );

        let server_args = build_server_args(&template.metadata().startup_args, port);
        let memory = options
            .memory
            .clone()
            .unwrap_or_else(|| template_config.memory.clone());

        let handle = self
            .processes
            .spawn(SpawnCommand {
                server_id: server_id.clone(),
                working_dir: server_dir.clone(),
                memory,
                exec_file: Some(template.metadata().server_jar.clone()),
                jvm_args: template_config.jvm_args.clone(),
                server_args,
                environment,
                kind: ServerKind::Dynamic,
            })
            .await?;
        rollback.process_id = Some(server_id.clone());

        let instance = Arc::new(ServerInstance::new(
            &server_id,
            ServerKind::Dynamic,
            server_dir,
            port,
            max_players,
            Some(Arc::clone(template)),
        ));
        for (key, value) in options.metadata {
            instance.set_metadata(key, value);
        }

        instance.mark_starting(Arc::clone(&handle));
        self.instances
            .insert(server_id.clone(), Arc::clone(&instance));
        rollback.instance_id = Some(server_id);

        self.scan_readiness(&instance, &handle).await?;

        Ok(instance)
    }

    /// Runs the readiness scanner and applies the resulting transition.
    async fn scan_readiness(
        &self,
        instance: &Arc<ServerInstance>,
        handle: &Arc<crate::process::ProcessHandle>,
    ) -> Result<()> {
        let timeout = Duration::from_secs(self.config.process_start_timeout_seconds);
        match wait_until_ready(instance.server_id(), handle, self.probe.as_ref(), timeout).await {
            Ok(()) => {
                instance.mark_running();
                Ok(())
            }
            Err(e) => {
                let reason = match &e {
                    OrchestratorError::ExitedDuringStartup { .. } => "Process exited during startup",
                    _ => "Startup timeout",
                };
                instance.mark_failed(reason);
                Err(e)
            }
        }
    }

    /// Releases everything an aborted spawn acquired, in reverse order.
    async fn run_rollback(&self, rollback: SpawnRollback) {
        if let Some(id) = &rollback.process_id {
            self.processes.kill(id, false, Duration::ZERO).await;
        }
        if let Some(id) = &rollback.instance_id {
            self.instances.remove(id);
        }
        if let Some(dir) = &rollback.clone_dir {
            if dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    warn!(dir = %dir.display(), error = %e, "failed to delete aborted clone");
                }
            }
        }
        if let Some(port) = rollback.port {
            self.ports.release(port);
        }
    }

    fn generate_server_id(&self, template: &Template) -> String {
        let prefix = template.metadata().effective_prefix();
        format!("{prefix}-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    // ---- shutdown ----

    /// Shuts down one instance: mark stopping, kill the process within the
    /// graceful deadline, release the port, reclaim the working directory
    /// of dynamics, drop the instance from the map.
    pub async fn shutdown_server(&self, server_id: &str, force: bool) -> Result<()> {
        let instance = match self.instances.get(server_id) {
            Some(entry) => Arc::clone(&entry),
            None => {
                warn!(server = %server_id, "server not found for shutdown");
                return Ok(());
            }
        };

        info!(server = %server_id, force, "shutting down server");
        instance.mark_stopping(if force {
            "Forced shutdown"
        } else {
            "Graceful shutdown"
        });

        // The manifest's deadline wins over the per-template config section.
        let deadline = instance
            .template()
            .map(|t| Duration::from_secs(t.metadata().graceful_shutdown_timeout))
            .unwrap_or(DEFAULT_GRACEFUL_DEADLINE);

        self.processes.kill(server_id, !force, deadline).await;
        self.ports.release(instance.port());

        if instance.is_dynamic() && self.config.dynamic_spawning.auto_cleanup {
            let dir = instance.working_dir();
            if dir.exists() {
                debug!(dir = %dir.display(), "cleaning up dynamic server directory");
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    error!(dir = %dir.display(), error = %e, "failed to delete working directory");
                }
            }
        }

        instance.mark_stopped();
        self.instances.remove(server_id);
        info!(server = %server_id, "server shut down");
        Ok(())
    }

    /// Drains the whole fleet: graceful shutdown of every instance, bounded
    /// by 60 s, then a forced kill of any laggards. Errors are logged and
    /// swallowed so every instance is attempted.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        info!("shutting down instance supervisor");

        let ids: Vec<String> = self.instances.iter().map(|i| i.key().clone()).collect();
        let drain = join_all(
            ids.iter()
                .map(|id| self.shutdown_server(id, false)),
        );
        if tokio::time::timeout(FLEET_SHUTDOWN_DEADLINE, drain).await.is_err() {
            warn!("timeout waiting for server shutdowns, forcing");
            for id in self.instances.iter().map(|i| i.key().clone()).collect::<Vec<_>>() {
                self.processes.kill(&id, false, Duration::from_secs(5)).await;
                if let Some((_, instance)) = self.instances.remove(&id) {
                    self.ports.release(instance.port());
                }
            }
        }

        info!("instance supervisor shut down");
    }

    // ---- health surveillance ----

    /// One pass of the fleet health probe; called on every probe tick.
    pub(crate) async fn perform_health_checks(self: &Arc<Self>) {
        if self.shutting_down.load(Ordering::Relaxed) {
            return;
        }
        for instance in self.instances() {
            if instance.status() == ServerStatus::Running {
                self.check_instance_health(&instance).await;
            }
        }
    }

    async fn check_instance_health(self: &Arc<Self>, instance: &Arc<ServerInstance>) {
        let alive = instance.process().is_some_and(|p| p.is_alive());
        if !alive {
            warn!(server = %instance.server_id(), "server process died unexpectedly");
            if let Some(previous) = instance.mark_failed("Process died") {
                self.bus.publish(
                    Event::now(EventKind::ServerHealth, instance.server_id())
                        .with_transition(previous, ServerStatus::Failed)
                        .with_message("Process died"),
                );
            }
            if instance.is_dynamic() {
                let supervisor = Arc::clone(self);
                let server_id = instance.server_id().to_string();
                tokio::spawn(async move {
                    if let Err(e) = supervisor.shutdown_server(&server_id, true).await {
                        error!(server = %server_id, error = %e, "failed to clean up dead server");
                    }
                });
            }
            return;
        }

        if let Some(last_heartbeat) = instance.last_heartbeat() {
            let overdue = Duration::from_secs(self.config.health_check_interval_seconds * 3);
            let elapsed = last_heartbeat.elapsed().unwrap_or(Duration::ZERO);
            if elapsed > overdue {
                warn!(server = %instance.server_id(), ?elapsed, "server heartbeat overdue");
                if let Some(previous) = instance.mark_unhealthy() {
                    self.bus.publish(
                        Event::now(EventKind::ServerHealth, instance.server_id())
                            .with_transition(previous, ServerStatus::Unhealthy)
                            .with_message("heartbeat overdue"),
                    );
                }
            }
        }
    }

    /// Records a heartbeat from the bridge plugin inside a child process.
    ///
    /// Recovery from `Unhealthy` back to `Running` emits a health event.
    pub fn on_heartbeat(&self, server_id: &str) {
        let Some(instance) = self.instance(server_id) else {
            warn!(server = %server_id, "heartbeat from unknown server");
            return;
        };
        if instance.on_heartbeat() {
            info!(server = %server_id, "server recovered");
            self.bus.publish(
                Event::now(EventKind::ServerHealth, server_id)
                    .with_transition(ServerStatus::Unhealthy, ServerStatus::Running)
                    .with_message("heartbeat received"),
            );
        }
    }

    // ---- queries ----

    /// The live instance with the given id, if any.
    pub fn instance(&self, server_id: &str) -> Option<Arc<ServerInstance>> {
        self.instances.get(server_id).map(|i| Arc::clone(&i))
    }

    /// Snapshot of all live instances.
    pub fn instances(&self) -> Vec<Arc<ServerInstance>> {
        self.instances.iter().map(|i| Arc::clone(&i)).collect()
    }

    /// Number of live instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of live dynamic instances.
    pub fn dynamic_count(&self) -> usize {
        self.instances.iter().filter(|i| i.is_dynamic()).count()
    }

    /// The health-probe interval from configuration.
    pub(crate) fn health_interval(&self) -> Duration {
        Duration::from_secs(self.config.health_check_interval_seconds)
    }
}

/// The declared server args (or the defaults) plus the `--bind <port>` pair.
fn build_server_args(declared: &[String], port: u16) -> Vec<String> {
    let mut args: Vec<String> = if declared.is_empty() {
        DEFAULT_SERVER_ARGS.iter().map(|s| s.to_string()).collect()
    } else {
        declared.to_vec()
    };
    args.push("--bind".to_string());
    args.push(port.to_string());
    args
}
