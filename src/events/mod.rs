//! Lifecycle events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the orchestrator façade
//! and the health probe.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`ShutdownReason`] — classification and payloads
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Orchestrator` (spawn/shutdown commits), the health
//!   probe (health transitions), heartbeat intake (recovery).
//! - **Consumers**: whatever the host attaches via [`Bus::subscribe`];
//!   delivery past the receiver is out of scope.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, ShutdownReason};
