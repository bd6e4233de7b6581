//! # Orchestrator: the public façade.
//!
//! Owns the runtime components (template store, process supervisor, instance
//! supervisor, registry, port allocator, event bus) and serialises operator
//! intents over them.
//!
//! ## Directory structure
//! ```text
//! servers/
//! ├── config.yml           # orchestrator configuration
//! ├── templates/           # template definitions
//! ├── static/              # persistent server working dirs
//! ├── dynamic/             # runtime-spawned servers (ephemeral)
//! └── logs/                # captured server output
//!     ├── static/
//!     └── dynamic/
//! ```
//!
//! ## Rules
//! - Every operation is guarded by an initialised check; id-bearing
//!   operations additionally resolve the id against the registry.
//! - Every successful state-changing transaction emits its event after the
//!   commit, in commit order.
//! - [`shutdown`](Orchestrator::shutdown) drains the fleet within 60 s and
//!   force-kills laggards; errors on that path are logged and swallowed.
//!
//! ## Example
//! ```no_run
//! use fleetvisor::{Orchestrator, SpawnOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new("servers");
//!     orchestrator.initialize().await?;
//!
//!     let instance = orchestrator
//!         .spawn_dynamic("bedwars", SpawnOptions::new().with_max_players(8))
//!         .await?;
//!     println!("spawned {} on port {}", instance.server_id(), instance.port());
//!
//!     orchestrator.shutdown_server(instance.server_id(), false).await?;
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::OrchestratorConfig;
use crate::core::health;
use crate::core::registry::{Registry, RegistryStats};
use crate::core::supervisor::InstanceSupervisor;
use crate::error::{OrchestratorError, Result};
use crate::events::{Bus, Event, EventKind, ShutdownReason};
use crate::instance::{ServerInstance, ServerKind, SpawnOptions};
use crate::ports::PortAllocator;
use crate::process::{ProcessMetrics, ProcessSupervisor};
use crate::template::{Template, TemplateStore};

/// Capacity of the lifecycle event bus.
const BUS_CAPACITY: usize = 1024;

/// The wired runtime, built once by `initialize()`.
struct Runtime {
    config: RwLock<OrchestratorConfig>,
    config_path: PathBuf,
    templates: Arc<TemplateStore>,
    processes: Arc<ProcessSupervisor>,
    supervisor: Arc<InstanceSupervisor>,
    registry: Arc<Registry>,
    health_token: CancellationToken,
}

/// Façade over the fleet orchestrator.
pub struct Orchestrator {
    root: PathBuf,
    bus: Bus,
    runtime: RwLock<Option<Arc<Runtime>>>,
    shutdown: AtomicBool,
}

impl Orchestrator {
    /// Creates an orchestrator rooted at `root` (conventionally `servers/`).
    ///
    /// No side effects until [`initialize`](Self::initialize).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bus: Bus::new(BUS_CAPACITY),
            runtime: RwLock::new(None),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Initialises the orchestrator: directory layout, configuration,
    /// component wiring, the fleet health probe, and always-on statics.
    pub async fn initialize(&self) -> Result<()> {
        if self.runtime.read().unwrap_or_else(|e| e.into_inner()).is_some() {
            return Err(OrchestratorError::AlreadyInitialized);
        }

        info!("initializing server management system");

        let templates_dir = self.root.join("templates");
        let static_dir = self.root.join("static");
        let dynamic_dir = self.root.join("dynamic");
        let logs_dir = self.root.join("logs");
        std::fs::create_dir_all(&self.root)?;

        let config_path = self.root.join("config.yml");
        let config = OrchestratorConfig::load(&config_path)?;

        let registry = Arc::new(Registry::new());
        let ports = Arc::new(PortAllocator::new());

        let processes = Arc::new(ProcessSupervisor::new(logs_dir, &config.java_path));
        processes.initialize()?;

        let templates = Arc::new(TemplateStore::new(templates_dir));
        templates.initialize(&config)?;

        let supervisor = Arc::new(InstanceSupervisor::new(
            config.clone(),
            Arc::clone(&templates),
            Arc::clone(&processes),
            ports,
            self.bus.clone(),
            static_dir,
            dynamic_dir,
        ));
        supervisor.initialize()?;

        let health_token = CancellationToken::new();
        health::spawn_probe(Arc::clone(&supervisor), health_token.clone());

        let runtime = Arc::new(Runtime {
            config: RwLock::new(config),
            config_path,
            templates,
            processes,
            supervisor,
            registry,
            health_token,
        });
        *self.runtime.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&runtime));

        self.boot_static_servers(&runtime).await;

        info!(
            templates = runtime.templates.names().len(),
            static_servers = runtime.registry.static_servers().len(),
            "server management system initialized"
        );
        Ok(())
    }

    /// Starts every configured always-on static server. Failures are logged
    /// and do not abort initialisation.
    async fn boot_static_servers(&self, runtime: &Arc<Runtime>) {
        let configs: Vec<(String, bool)> = {
            let config = runtime.config.read().unwrap_or_else(|e| e.into_inner());
            config
                .static_servers
                .iter()
                .map(|(id, c)| (id.clone(), c.always_on))
                .collect()
        };

        for (server_id, always_on) in configs {
            if !always_on {
                info!(server = %server_id, "static server configured but not always-on");
                continue;
            }
            info!(server = %server_id, "starting static server");
            if let Err(e) = self.start_static(&server_id).await {
                error!(server = %server_id, error = %e, "failed to start static server");
            }
        }
    }

    fn runtime(&self) -> Result<Arc<Runtime>> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(OrchestratorError::NotInitialized);
        }
        self.runtime
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(OrchestratorError::NotInitialized)
    }

    // ---- operator intents ----

    /// Starts a configured static server and registers it.
    pub async fn start_static(&self, server_id: &str) -> Result<Arc<ServerInstance>> {
        let runtime = self.runtime()?;

        if runtime.registry.contains(server_id) {
            return Err(OrchestratorError::ServerAlreadyExists {
                server_id: server_id.to_string(),
            });
        }
        let static_config = {
            let config = runtime.config.read().unwrap_or_else(|e| e.into_inner());
            config.static_servers.get(server_id).cloned()
        }
        .ok_or_else(|| OrchestratorError::StaticNotConfigured {
            server_id: server_id.to_string(),
        })?;

        let instance = runtime
            .supervisor
            .start_static(server_id, &static_config)
            .await?;
        self.commit_spawn(&runtime, instance).await
    }

    /// Spawns a dynamic server from a template and registers it.
    pub async fn spawn_dynamic(
        &self,
        template_name: &str,
        options: SpawnOptions,
    ) -> Result<Arc<ServerInstance>> {
        let runtime = self.runtime()?;

        if !runtime.templates.contains(template_name) {
            return Err(OrchestratorError::TemplateNotFound {
                name: template_name.to_string(),
            });
        }
        if let Some(requested) = options.server_id.as_deref() {
            if runtime.registry.contains(requested) {
                return Err(OrchestratorError::ServerAlreadyExists {
                    server_id: requested.to_string(),
                });
            }
        }

        let instance = runtime
            .supervisor
            .spawn_dynamic(template_name, options)
            .await?;
        self.commit_spawn(&runtime, instance).await
    }

    /// Registers a freshly spawned instance and emits `ServerSpawn`.
    ///
    /// A registration conflict rolls the spawn back so no resource leaks.
    async fn commit_spawn(
        &self,
        runtime: &Arc<Runtime>,
        instance: Arc<ServerInstance>,
    ) -> Result<Arc<ServerInstance>> {
        if let Err(e) = runtime.registry.register(Arc::clone(&instance)) {
            error!(server = %instance.server_id(), error = %e, "registration conflict, rolling back");
            let _ = runtime
                .supervisor
                .shutdown_server(instance.server_id(), true)
                .await;
            return Err(e);
        }

        let mut event = Event::now(EventKind::ServerSpawn, instance.server_id())
            .with_server_kind(instance.kind())
            .with_port(instance.port());
        if let Some(template) = instance.template() {
            event = event.with_template(template.name());
        }
        self.bus.publish(event);

        Ok(instance)
    }

    /// Shuts a server down (static or dynamic) and unregisters it.
    ///
    /// An unknown id is a benign no-op with a warning, which also makes a
    /// repeated shutdown of the same server a no-op once the first one
    /// completed.
    pub async fn shutdown_server(&self, server_id: &str, force: bool) -> Result<()> {
        let runtime = self.runtime()?;

        let Some(instance) = runtime.registry.by_id(server_id) else {
            warn!(server = %server_id, "server not found for shutdown");
            return Ok(());
        };

        // Operator-initiated shutdowns report AdminRequest on both paths.
        self.bus.publish(
            Event::now(EventKind::ServerShutdown, server_id)
                .with_server_kind(instance.kind())
                .with_reason(ShutdownReason::AdminRequest)
                .with_forced(force),
        );

        runtime.supervisor.shutdown_server(server_id, force).await?;
        runtime.registry.unregister(server_id);
        info!(server = %server_id, "server shut down");
        Ok(())
    }

    /// Restarts a server: shutdown chained with a fresh start (static) or a
    /// respawn from the original template preserving id and capacity
    /// (dynamic).
    pub async fn restart(&self, server_id: &str) -> Result<Arc<ServerInstance>> {
        let runtime = self.runtime()?;

        let instance =
            runtime
                .registry
                .by_id(server_id)
                .ok_or_else(|| OrchestratorError::ServerNotFound {
                    server_id: server_id.to_string(),
                })?;

        if instance.is_static() {
            self.shutdown_server(server_id, false).await?;
            return self.start_static(server_id).await;
        }

        let template =
            instance
                .template()
                .ok_or_else(|| OrchestratorError::NoTemplateForRestart {
                    server_id: server_id.to_string(),
                })?;
        let options = SpawnOptions::new()
            .with_server_id(server_id)
            .with_max_players(instance.max_players());

        self.shutdown_server(server_id, false).await?;
        self.spawn_dynamic(template.name(), options).await
    }

    /// Records a heartbeat from the bridge plugin inside a child process.
    pub fn on_heartbeat(&self, server_id: &str) -> Result<()> {
        let runtime = self.runtime()?;
        runtime.supervisor.on_heartbeat(server_id);
        Ok(())
    }

    // ---- queries ----

    /// The registered instance with the given id.
    pub fn server(&self, server_id: &str) -> Result<Option<Arc<ServerInstance>>> {
        Ok(self.runtime()?.registry.by_id(server_id))
    }

    /// All registered instances.
    pub fn servers(&self) -> Result<Vec<Arc<ServerInstance>>> {
        Ok(self.runtime()?.registry.servers())
    }

    /// Registered instances of one kind.
    pub fn servers_by_kind(&self, kind: ServerKind) -> Result<Vec<Arc<ServerInstance>>> {
        Ok(self.runtime()?.registry.by_kind(kind))
    }

    /// The best instance to route a player to, optionally per template.
    pub fn find_available(&self, template_name: Option<&str>) -> Result<Option<Arc<ServerInstance>>> {
        Ok(self.runtime()?.registry.find_available(template_name))
    }

    /// Aggregate registry counters.
    pub fn stats(&self) -> Result<RegistryStats> {
        Ok(self.runtime()?.registry.stats())
    }

    /// A published template by name.
    pub fn template(&self, name: &str) -> Result<Option<Arc<Template>>> {
        Ok(self.runtime()?.templates.by_name(name))
    }

    /// All published templates.
    pub fn templates(&self) -> Result<Vec<Arc<Template>>> {
        Ok(self.runtime()?.templates.templates())
    }

    /// Recent captured log lines of a live instance.
    pub fn recent_logs(&self, server_id: &str, count: usize) -> Result<Vec<String>> {
        Ok(self.runtime()?.processes.recent_logs(server_id, count))
    }

    /// Process metrics of a live instance.
    pub fn process_metrics(&self, server_id: &str) -> Result<Option<ProcessMetrics>> {
        Ok(self.runtime()?.processes.metrics(server_id))
    }

    /// The event bus; subscribe before `initialize()` to observe boot events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// True once `initialize()` has completed and `shutdown()` has not run.
    pub fn is_initialized(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
            && self.runtime.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// The orchestrator root directory.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    // ---- lifecycle ----

    /// Reloads configuration and re-discovers templates.
    pub fn reload(&self) -> Result<()> {
        let runtime = self.runtime()?;
        info!("reloading orchestrator");

        let fresh = OrchestratorConfig::load(&runtime.config_path)?;
        *runtime.config.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        runtime.templates.reload_all()?;

        info!("orchestrator reloaded");
        Ok(())
    }

    /// Shuts the whole system down: every dynamic instance gets a
    /// `ProxyShutdown` event, the fleet is drained within 60 s, laggards are
    /// force-killed, and the registry is cleared.
    pub async fn shutdown(&self) {
        let Ok(runtime) = self.runtime() else {
            return;
        };
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("shutting down server management system");

        for instance in runtime.registry.dynamic_servers() {
            self.bus.publish(
                Event::now(EventKind::ServerShutdown, instance.server_id())
                    .with_server_kind(instance.kind())
                    .with_reason(ShutdownReason::ProxyShutdown)
                    .with_forced(false),
            );
        }

        runtime.health_token.cancel();
        runtime.supervisor.shutdown().await;
        runtime.processes.shutdown().await;
        runtime.registry.clear();

        info!("server management system shut down");
    }
}
