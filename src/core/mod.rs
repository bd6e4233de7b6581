//! Runtime core: orchestration and lifecycle.
//!
//! This module contains the embedded implementation of the fleetvisor
//! runtime. The public API re-exported from here is [`Orchestrator`],
//! [`Registry`], and [`RegistryStats`]; everything else is an internal
//! building block the orchestrator wires together.
//!
//! ## Files & responsibilities
//! - **orchestrator.rs**: public façade; owns the runtime (config, template
//!   store, process supervisor, instance supervisor, registry, bus), guards
//!   every intent with an initialised check, emits lifecycle events after
//!   commits, drives fleet shutdown.
//! - **supervisor.rs**: instance lifecycle transactions: spawn-static,
//!   spawn-dynamic (with compensating rollback), shutdown, heartbeat intake,
//!   boot-time purge of the dynamic root.
//! - **registry.rs**: id- and port-keyed index of live instances with query
//!   primitives and stats.
//! - **readiness.rs**: the readiness predicate ([`ReadinessProbe`]) and the
//!   bounded 500 ms scanner that drives Starting → Running/Failed.
//! - **health.rs**: the periodic fleet health probe.
//!
//! ## Wiring (module-level flow)
//! ```text
//! Operator intent
//!   └─ Orchestrator::{start_static, spawn_dynamic, shutdown_server, restart}
//!
//! spawn_dynamic(template, opts)
//!   ├─ guard: initialised, template known, id unused
//!   ├─ InstanceSupervisor::spawn_dynamic
//!   │    ├─ guard: spawning enabled, below max-concurrent
//!   │    ├─ PortAllocator::acquire_in_range      ──┐
//!   │    ├─ Template::clone_to(dynamic/<id>)       │ released in reverse
//!   │    ├─ ProcessSupervisor::spawn               │ on any failure
//!   │    ├─ instance map insert                  ──┘
//!   │    └─ readiness scan ─► Running | Failed
//!   ├─ Registry::register (conflict ⇒ rollback via forced shutdown)
//!   └─ Bus::publish(ServerSpawn)
//!
//! health probe (every health_check_interval_seconds)
//!   └─ for each Running instance:
//!        ├─ process dead  ─► Failed + ServerHealth; dynamic ⇒ async cleanup
//!        └─ heartbeat older than 3×interval ─► Unhealthy + ServerHealth
//!
//! shutdown_server(id, force)
//!   ├─ Bus::publish(ServerShutdown{AdminRequest, forced})
//!   ├─ InstanceSupervisor::shutdown_server
//!   │    ├─ Stopping ─► kill (graceful deadline from template metadata)
//!   │    ├─ release port; dynamic ⇒ delete working dir
//!   │    └─ Stopped ─► drop from instance map
//!   └─ Registry::unregister
//! ```
//!
//! ## Shutdown timeline
//! ```text
//! Orchestrator::shutdown()
//!   → ServerShutdown{ProxyShutdown} per dynamic instance
//!   → cancel health probe
//!   → InstanceSupervisor::shutdown(): drain fleet, ≤ 60 s, then force-kill
//!   → ProcessSupervisor::shutdown(): graceful 10 s per child, then force
//!   → Registry::clear()
//! ```

mod health;
mod orchestrator;
mod readiness;
mod registry;
mod supervisor;

pub use orchestrator::Orchestrator;
pub use readiness::{LogScanProbe, ReadinessProbe};
pub use registry::{Registry, RegistryStats};
pub use supervisor::InstanceSupervisor;
