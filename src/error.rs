//! # Error types used by the fleetvisor runtime.
//!
//! A single [`OrchestratorError`] enum covers the three failure families of
//! the orchestrator:
//!
//! - **precondition** errors: reported to the caller, no state was changed;
//! - **IO** errors: during a spawn transaction these trigger a full rollback,
//!   mid-life they are logged and survived;
//! - **runtime** errors: the instance transitions to `Failed`, resources are
//!   released, the caller's future fails.
//!
//! The type provides `as_label()` for metrics and `is_precondition()` to
//! classify a failure without matching every variant.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the fleet orchestrator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// An operation was invoked before `initialize()` completed.
    #[error("orchestrator is not initialized")]
    NotInitialized,

    /// `initialize()` was invoked twice.
    #[error("orchestrator is already initialized")]
    AlreadyInitialized,

    /// No template with the given name is known to the store.
    #[error("template '{name}' not found")]
    TemplateNotFound {
        /// The missing template name.
        name: String,
    },

    /// No live instance with the given identifier.
    #[error("server '{server_id}' not found")]
    ServerNotFound {
        /// The unknown server identifier.
        server_id: String,
    },

    /// An instance with the given identifier is already live.
    #[error("server '{server_id}' already exists")]
    ServerAlreadyExists {
        /// The duplicate server identifier.
        server_id: String,
    },

    /// A fixed port requested for a static server is already taken.
    #[error("port {port} is already in use")]
    PortInUse {
        /// The contested port.
        port: u16,
    },

    /// No free port remained in the requested range.
    #[error("no free port in range {lo}-{hi}")]
    PortsExhausted {
        /// Inclusive range start.
        lo: u16,
        /// Inclusive range end.
        hi: u16,
    },

    /// Dynamic spawning is disabled in configuration.
    #[error("dynamic spawning is disabled")]
    SpawningDisabled,

    /// The configured ceiling of concurrent dynamic instances was reached.
    #[error("maximum of {max} concurrent dynamic servers reached")]
    MaxConcurrentReached {
        /// The configured ceiling.
        max: usize,
    },

    /// `start_static` was called for an id absent from configuration.
    #[error("static server '{server_id}' is not configured")]
    StaticNotConfigured {
        /// The unconfigured server identifier.
        server_id: String,
    },

    /// A working directory expected on disk does not exist.
    #[error("working directory does not exist: {dir}")]
    WorkingDirMissing {
        /// The missing directory.
        dir: PathBuf,
    },

    /// A clone destination already exists.
    #[error("destination already exists: {dest}")]
    DestinationExists {
        /// The contested destination path.
        dest: PathBuf,
    },

    /// No server jar could be resolved inside a working directory.
    #[error("no server artifact found in {dir}")]
    NoServerArtifact {
        /// The directory that was scanned.
        dir: PathBuf,
    },

    /// A dynamic instance cannot be restarted without a template reference.
    #[error("server '{server_id}' has no template to respawn from")]
    NoTemplateForRestart {
        /// The affected server identifier.
        server_id: String,
    },

    /// The child process exited while the readiness scanner was running.
    #[error("process for '{server_id}' exited during startup")]
    ExitedDuringStartup {
        /// The affected server identifier.
        server_id: String,
    },

    /// The readiness deadline elapsed and the child was no longer alive.
    #[error("startup of '{server_id}' timed out after {timeout:?}")]
    StartupTimeout {
        /// The affected server identifier.
        server_id: String,
        /// The configured readiness deadline.
        timeout: Duration,
    },

    /// Filesystem or process I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration or manifest document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        OrchestratorError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::NotInitialized => "not_initialized",
            OrchestratorError::AlreadyInitialized => "already_initialized",
            OrchestratorError::TemplateNotFound { .. } => "template_not_found",
            OrchestratorError::ServerNotFound { .. } => "server_not_found",
            OrchestratorError::ServerAlreadyExists { .. } => "server_already_exists",
            OrchestratorError::PortInUse { .. } => "port_in_use",
            OrchestratorError::PortsExhausted { .. } => "ports_exhausted",
            OrchestratorError::SpawningDisabled => "spawning_disabled",
            OrchestratorError::MaxConcurrentReached { .. } => "max_concurrent_reached",
            OrchestratorError::StaticNotConfigured { .. } => "static_not_configured",
            OrchestratorError::WorkingDirMissing { .. } => "working_dir_missing",
            OrchestratorError::DestinationExists { .. } => "destination_exists",
            OrchestratorError::NoServerArtifact { .. } => "no_server_artifact",
            OrchestratorError::NoTemplateForRestart { .. } => "no_template_for_restart",
            OrchestratorError::ExitedDuringStartup { .. } => "exited_during_startup",
            OrchestratorError::StartupTimeout { .. } => "startup_timeout",
            OrchestratorError::Io(_) => "io",
            OrchestratorError::Config(_) => "config",
        }
    }

    /// Indicates whether the error is a precondition failure, i.e. the
    /// operation was rejected before any state changed.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            OrchestratorError::Io(_)
                | OrchestratorError::Config(_)
                | OrchestratorError::ExitedDuringStartup { .. }
                | OrchestratorError::StartupTimeout { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
