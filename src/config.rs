//! # Orchestrator configuration.
//!
//! [`OrchestratorConfig`] is loaded from `servers/config.yml` and defines the
//! Java executable, static servers, per-template settings, dynamic spawning
//! limits, port ranges, and surveillance intervals.
//!
//! Missing fields fall back to their documented defaults; a missing file is
//! replaced by a freshly written default document so operators always have a
//! config to edit.
//!
//! # Example
//! ```
//! use fleetvisor::OrchestratorConfig;
//!
//! let cfg = OrchestratorConfig::default();
//! assert_eq!(cfg.java_path, "java");
//! assert_eq!(cfg.health_check_interval_seconds, 30);
//! assert_eq!(cfg.port_allocation.dynamic_range_start, 6100);
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Top-level configuration for the server management system.
///
/// Defaults:
/// - `java_path = "java"`
/// - `default_fallback_server = "lobby"`
/// - `health_check_interval_seconds = 30`
/// - `process_start_timeout_seconds = 60`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Path to the Java executable used to launch backend servers.
    pub java_path: String,
    /// Server players are routed to when their instance goes away.
    pub default_fallback_server: String,
    /// Interval of the fleet health probe, in seconds.
    pub health_check_interval_seconds: u64,
    /// Readiness-scan deadline for a starting process, in seconds.
    pub process_start_timeout_seconds: u64,
    /// Dynamic spawning limits.
    pub dynamic_spawning: DynamicSpawningConfig,
    /// Declared port ranges.
    pub port_allocation: PortAllocationConfig,
    /// Static servers keyed by server id.
    pub static_servers: HashMap<String, StaticServerConfig>,
    /// Per-template settings keyed by lower-cased template name.
    pub templates: HashMap<String, TemplateConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            java_path: "java".to_string(),
            default_fallback_server: "lobby".to_string(),
            health_check_interval_seconds: 30,
            process_start_timeout_seconds: 60,
            dynamic_spawning: DynamicSpawningConfig::default(),
            port_allocation: PortAllocationConfig::default(),
            static_servers: HashMap::new(),
            templates: HashMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration from `path`, writing a default document first if
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = OrchestratorConfig::default();
            config.save(path)?;
            info!(path = %path.display(), "wrote default orchestrator config");
            return Ok(config);
        }

        let raw = std::fs::read_to_string(path)?;
        let config: OrchestratorConfig = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    /// Saves the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Per-template settings, synthesised empty when the template has no
    /// config section. Lookup is case-insensitive.
    pub fn template_config(&self, name: &str) -> TemplateConfig {
        self.templates
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

/// Configuration for a static (persistent) server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaticServerConfig {
    /// Fixed listening port.
    pub port: u16,
    /// Maximum player capacity.
    pub max_players: u32,
    /// Start this server as part of orchestrator initialisation.
    pub always_on: bool,
    /// Heap size handed to the JVM, e.g. "2G".
    pub memory: String,
    /// Extra JVM arguments inserted before `-jar`.
    pub jvm_args: Vec<String>,
    /// Extra environment variables for the child process.
    pub environment: HashMap<String, String>,
    /// Server arguments appended after the jar; defaults apply when empty.
    pub server_args: Vec<String>,
}

impl Default for StaticServerConfig {
    fn default() -> Self {
        Self {
            port: 6000,
            max_players: 100,
            always_on: true,
            memory: "2G".to_string(),
            jvm_args: Vec::new(),
            environment: HashMap::new(),
            server_args: Vec::new(),
        }
    }
}

/// Per-template settings from the orchestrator config.
///
/// These complement the template's own manifest: the manifest describes the
/// files on disk, this section describes how the orchestrator runs them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateConfig {
    /// Human-readable name for listings.
    pub display_name: Option<String>,
    /// Default maximum player capacity for spawned instances.
    pub max_players: u32,
    /// Inclusive start of the port range instances are allocated from.
    pub port_range_start: u16,
    /// Inclusive end of the port range.
    pub port_range_end: u16,
    /// Heap size handed to the JVM.
    pub memory: String,
    /// Reset world state on shutdown.
    pub world_reset: bool,
    /// Delay before an idle instance is reclaimed, in seconds.
    pub auto_cleanup_delay_seconds: u64,
    /// Graceful-shutdown deadline, in seconds. The template manifest's value
    /// takes precedence when present.
    pub graceful_shutdown_timeout_seconds: u64,
    /// Extra JVM arguments inserted before `-jar`.
    pub jvm_args: Vec<String>,
    /// Extra environment variables for spawned instances.
    pub environment: HashMap<String, String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            max_players: 16,
            port_range_start: 6100,
            port_range_end: 6500,
            memory: "2G".to_string(),
            world_reset: true,
            auto_cleanup_delay_seconds: 300,
            graceful_shutdown_timeout_seconds: 30,
            jvm_args: Vec::new(),
            environment: HashMap::new(),
        }
    }
}

/// Limits on dynamic spawning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicSpawningConfig {
    /// Master switch for `spawn_dynamic`.
    pub enabled: bool,
    /// Delete the working directory of a dynamic instance on shutdown.
    pub auto_cleanup: bool,
    /// Ceiling of concurrently live dynamic instances.
    pub max_concurrent: usize,
    /// Warn threshold for remaining free dynamic ports.
    pub min_available_ports: usize,
}

impl Default for DynamicSpawningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_cleanup: true,
            max_concurrent: 50,
            min_available_ports: 10,
        }
    }
}

/// Declared port ranges for static and dynamic servers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortAllocationConfig {
    /// Inclusive start of the static range.
    pub static_range_start: u16,
    /// Inclusive end of the static range.
    pub static_range_end: u16,
    /// Inclusive start of the dynamic range.
    pub dynamic_range_start: u16,
    /// Inclusive end of the dynamic range.
    pub dynamic_range_end: u16,
}

impl Default for PortAllocationConfig {
    fn default() -> Self {
        Self {
            static_range_start: 6000,
            static_range_end: 6050,
            dynamic_range_start: 6100,
            dynamic_range_end: 6500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.java_path, "java");
        assert_eq!(cfg.process_start_timeout_seconds, 60);
        assert!(cfg.dynamic_spawning.enabled);
        assert_eq!(cfg.dynamic_spawning.max_concurrent, 50);
        assert_eq!(cfg.port_allocation.static_range_start, 6000);
        assert_eq!(cfg.port_allocation.dynamic_range_end, 6500);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let cfg: OrchestratorConfig = serde_yaml::from_str(
            r#"
javaPath: /opt/jdk/bin/java
templates:
  bedwars:
    portRangeStart: 6100
    portRangeEnd: 6200
"#,
        )
        .unwrap();
        assert_eq!(cfg.java_path, "/opt/jdk/bin/java");
        assert_eq!(cfg.health_check_interval_seconds, 30);
        let bedwars = cfg.template_config("BedWars");
        assert_eq!(bedwars.port_range_end, 6200);
        assert_eq!(bedwars.max_players, 16);
        assert_eq!(bedwars.memory, "2G");
    }

    #[test]
    fn unknown_template_yields_defaults() {
        let cfg = OrchestratorConfig::default();
        let tc = cfg.template_config("nonexistent");
        assert_eq!(tc.port_range_start, 6100);
        assert_eq!(tc.graceful_shutdown_timeout_seconds, 30);
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let cfg = OrchestratorConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.java_path, "java");

        // Second load parses the file just written.
        let again = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(again.default_fallback_server, "lobby");
    }
}
