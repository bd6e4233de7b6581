//! # fleetvisor
//!
//! **Fleetvisor** is a fleet orchestrator for backend game-server processes.
//!
//! Operators declare **templates** (archetypes of a backend server: files on
//! disk plus metadata) and **static** servers (persistent, declared in
//! configuration); the orchestrator materialises these into live OS
//! processes, allocates them listening ports, tracks their lifecycle and
//! player occupancy, performs periodic health surveillance, and tears them
//! down — cleaning transient state — on request, on crash, or on shutdown.
//!
//! ## Features
//!
//! | Area                | Description                                                         | Key types                                   |
//! |---------------------|---------------------------------------------------------------------|---------------------------------------------|
//! | **Orchestration**   | Spawn, shutdown, restart, and query server instances.               | [`Orchestrator`], [`SpawnOptions`]          |
//! | **Templates**       | Discover, validate, and materialise server archetypes.              | [`TemplateStore`], [`Template`]             |
//! | **Processes**       | Child-process spawning, log capture, liveness, termination.         | [`ProcessSupervisor`], [`ProcessHandle`]    |
//! | **Instances**       | Per-instance state machine, players, heartbeats.                    | [`ServerInstance`], [`ServerStatus`]        |
//! | **Registry**        | Index of live instances by identifier and by port.                  | [`Registry`], [`RegistryStats`]             |
//! | **Ports**           | Unique listening ports from declared ranges.                        | [`PortAllocator`]                           |
//! | **Events**          | Lifecycle events on a broadcast bus.                                | [`Event`], [`EventKind`], [`Bus`]           |
//! | **Errors**          | Typed precondition / IO / runtime failures.                         | [`OrchestratorError`]                       |
//! | **Configuration**   | YAML-backed settings with documented defaults.                      | [`OrchestratorConfig`]                      |
//!
//! ```no_run
//! use fleetvisor::{Orchestrator, SpawnOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new("servers");
//!     let mut events = orchestrator.bus().subscribe();
//!     orchestrator.initialize().await?;
//!
//!     // Spawn a dynamic server from the "bedwars" template.
//!     let instance = orchestrator
//!         .spawn_dynamic("bedwars", SpawnOptions::new().with_max_players(8))
//!         .await?;
//!     println!("{} listening on {}", instance.server_id(), instance.port());
//!
//!     if let Ok(event) = events.recv().await {
//!         println!("event: {:?} for {}", event.kind, event.server_id);
//!     }
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod config;
mod core;
mod error;
mod events;
mod instance;
mod ports;
mod process;
mod template;

// ---- Public re-exports ----

pub use config::{
    DynamicSpawningConfig, OrchestratorConfig, PortAllocationConfig, StaticServerConfig,
    TemplateConfig,
};
pub use core::{
    InstanceSupervisor, LogScanProbe, Orchestrator, ReadinessProbe, Registry, RegistryStats,
};
pub use error::{OrchestratorError, Result};
pub use events::{Bus, Event, EventKind, ShutdownReason};
pub use instance::{ServerInstance, ServerKind, ServerStatus, SpawnOptions};
pub use ports::PortAllocator;
pub use process::{ProcessHandle, ProcessMetrics, ProcessSupervisor, SpawnCommand};
pub use template::{Template, TemplateMetadata, TemplateStore};
