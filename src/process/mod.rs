//! # Backend process management.
//!
//! - [`ProcessSupervisor`] — spawns children with the constructed command
//!   line, captures their combined output, probes liveness, terminates them
//! - [`ProcessHandle`] — per-child metadata: pid, log file, ring buffer,
//!   latched exit code
//! - [`SpawnCommand`] — everything a spawn needs
//! - [`ProcessMetrics`] — point-in-time resource snapshot

mod handle;
mod supervisor;

pub use handle::{ProcessHandle, ProcessMetrics};
pub use supervisor::{ProcessSupervisor, SpawnCommand};
