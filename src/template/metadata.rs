//! # Template manifest, loaded from `template.yml`.
//!
//! Every recognised field is optional on disk; absent fields take the
//! documented defaults so a bare template directory is still runnable.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Manifest filename inside a template directory.
pub const MANIFEST_FILE: &str = "template.yml";

fn default_type() -> String {
    "minigame".to_string()
}

fn default_max_players() -> u32 {
    16
}

fn default_memory() -> String {
    "2G".to_string()
}

fn default_world_reset() -> bool {
    true
}

fn default_graceful_timeout() -> u64 {
    30
}

fn default_server_jar() -> String {
    "HytaleServer.jar".to_string()
}

fn default_respawn_location() -> HashMap<String, f64> {
    HashMap::from([
        ("x".to_string(), 0.0),
        ("y".to_string(), 64.0),
        ("z".to_string(), 0.0),
    ])
}

/// Metadata for a server template.
///
/// Contains everything needed to spawn a dynamic server from the template.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateMetadata {
    /// Template name; falls back to the directory name when absent.
    pub name: Option<String>,
    /// Free-form category, e.g. "minigame".
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    /// Prefix for generated server ids; see [`effective_prefix`](Self::effective_prefix).
    pub server_id_prefix: Option<String>,
    /// Default maximum player capacity.
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// JVM heap size, e.g. "2G".
    #[serde(default = "default_memory")]
    pub memory_allocation: String,
    /// Reset world state when the instance shuts down.
    #[serde(default = "default_world_reset")]
    pub world_reset_on_shutdown: bool,
    /// Seconds the child gets to exit on its own before forced kill.
    #[serde(default = "default_graceful_timeout")]
    pub graceful_shutdown_timeout: u64,
    /// Default respawn coordinates.
    #[serde(default = "default_respawn_location")]
    pub respawn_location: HashMap<String, f64>,
    /// Server executable filename inside the template.
    #[serde(default = "default_server_jar")]
    pub server_jar: String,
    /// Server arguments; when empty the standard defaults apply.
    pub startup_args: Vec<String>,
}

impl Default for TemplateMetadata {
    fn default() -> Self {
        Self {
            name: None,
            kind: default_type(),
            server_id_prefix: None,
            max_players: default_max_players(),
            memory_allocation: default_memory(),
            world_reset_on_shutdown: default_world_reset(),
            graceful_shutdown_timeout: default_graceful_timeout(),
            respawn_location: default_respawn_location(),
            server_jar: default_server_jar(),
            startup_args: Vec::new(),
        }
    }
}

impl TemplateMetadata {
    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let metadata: TemplateMetadata = serde_yaml::from_str(&raw)?;
        Ok(metadata)
    }

    /// Writes the manifest to disk, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Synthesises defaults for a template directory without a manifest.
    pub fn defaults_for(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            server_id_prefix: Some(name.to_lowercase()),
            ..Self::default()
        }
    }

    /// The effective prefix for generated server ids: the explicit prefix,
    /// else the lower-cased name with non-alphanumerics folded to `-`,
    /// else "server".
    pub fn effective_prefix(&self) -> String {
        if let Some(prefix) = self.server_id_prefix.as_deref() {
            if !prefix.is_empty() {
                return prefix.to_string();
            }
        }
        if let Some(name) = self.name.as_deref() {
            if !name.is_empty() {
                return name
                    .to_lowercase()
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                    .collect();
            }
        }
        "server".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_takes_defaults() {
        let md: TemplateMetadata = serde_yaml::from_str("{}").unwrap();
        assert_eq!(md.max_players, 16);
        assert_eq!(md.memory_allocation, "2G");
        assert!(md.world_reset_on_shutdown);
        assert_eq!(md.graceful_shutdown_timeout, 30);
        assert_eq!(md.server_jar, "HytaleServer.jar");
        assert_eq!(md.respawn_location.get("y"), Some(&64.0));
    }

    #[test]
    fn manifest_fields_override_defaults() {
        let md: TemplateMetadata = serde_yaml::from_str(
            r#"
name: Bedwars
serverIdPrefix: bw
maxPlayers: 8
memoryAllocation: 4G
gracefulShutdownTimeout: 10
startupArgs: ["--assets", "Assets.zip"]
"#,
        )
        .unwrap();
        assert_eq!(md.name.as_deref(), Some("Bedwars"));
        assert_eq!(md.effective_prefix(), "bw");
        assert_eq!(md.max_players, 8);
        assert_eq!(md.graceful_shutdown_timeout, 10);
        assert_eq!(md.startup_args.len(), 2);
    }

    #[test]
    fn prefix_falls_back_to_folded_name() {
        let md: TemplateMetadata = serde_yaml::from_str("name: Sky Wars 2").unwrap();
        assert_eq!(md.effective_prefix(), "sky-wars-2");

        let bare = TemplateMetadata::default();
        assert_eq!(bare.effective_prefix(), "server");
    }

    #[test]
    fn defaults_for_seeds_name_and_prefix() {
        let md = TemplateMetadata::defaults_for("BedWars");
        assert_eq!(md.name.as_deref(), Some("BedWars"));
        assert_eq!(md.effective_prefix(), "bedwars");
    }
}
