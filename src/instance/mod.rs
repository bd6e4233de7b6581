//! # Server instances: classification and per-instance state.
//!
//! - [`ServerKind`] — static (persistent) vs. dynamic (ephemeral)
//! - [`ServerStatus`] — the lifecycle state machine with total-match predicates
//! - [`ServerInstance`] — one backend server: process handle, players, health
//! - [`SpawnOptions`] — caller overrides for dynamic spawning

mod instance;
mod status;

pub use instance::{ServerInstance, SpawnOptions};
pub use status::{ServerKind, ServerStatus};
