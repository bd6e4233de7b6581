//! # A server template on disk.
//!
//! Templates live in `servers/templates/<name>/` and contain every file
//! needed to materialise a runnable working directory for a dynamic server:
//!
//! ```text
//! servers/templates/bedwars/
//! ├── template.yml          # manifest (optional, defaults applied)
//! ├── HytaleServer.jar      # server executable
//! ├── Assets.zip            # game assets (warn-only when absent)
//! ├── config.json           # per-instance config (generated when absent)
//! ├── plugins/              # plugin directory, bridge plugin expected
//! └── universe/             # world data
//! ```
//!
//! ## Rules
//! - A template is immutable once published by the store; reloads replace
//!   the `Arc`, never mutate in place.
//! - [`clone_to`](Template::clone_to) is **not** transactional: on partial
//!   failure the caller deletes the destination.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{OrchestratorError, Result};
use crate::template::metadata::{TemplateMetadata, MANIFEST_FILE};

/// Generated per-instance config artifact.
const CONFIG_JSON_FILE: &str = "config.json";
/// Startup script made executable after cloning.
const STARTUP_SCRIPT: &str = "startup.sh";
/// Plugin directory expected to hold the bridge plugin.
const PLUGINS_DIR: &str = "plugins";
/// World data directory.
const UNIVERSE_DIR: &str = "universe";

/// Override keys consumed by [`Template::clone_to`].
pub const OVERRIDE_PORT: &str = "server-port";
pub const OVERRIDE_SERVER_ID: &str = "server-id";
pub const OVERRIDE_MAX_PLAYERS: &str = "max-players";

/// Resolves the server executable inside `dir`.
///
/// Order: the preferred name if that file exists, else the first `*.jar`
/// whose lower-cased name contains "server" or "hytale", else the first
/// `*.jar` at all.
pub(crate) fn find_server_artifact(dir: &Path, preferred: Option<&str>) -> Option<String> {
    if let Some(name) = preferred {
        if dir.join(name).is_file() {
            return Some(name.to_string());
        }
    }

    let mut jars: Vec<String> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "jar"))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    jars.sort();

    jars.iter()
        .find(|name| {
            let lower = name.to_lowercase();
            lower.contains("server") || lower.contains("hytale")
        })
        .cloned()
        .or_else(|| jars.first().cloned())
}

/// A validated, immutable template.
#[derive(Debug)]
pub struct Template {
    name: String,
    root: PathBuf,
    metadata: TemplateMetadata,
    validation_errors: Vec<String>,
}

impl Template {
    /// Loads a template from its directory, applying manifest defaults and
    /// running validation.
    pub fn load(root: &Path) -> Result<Self> {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let manifest = root.join(MANIFEST_FILE);
        let metadata = if manifest.exists() {
            let mut md = TemplateMetadata::load(&manifest)?;
            if md.name.is_none() {
                md.name = Some(name.clone());
            }
            md
        } else {
            warn!(template = %name, "missing template.yml, using defaults");
            TemplateMetadata::defaults_for(&name)
        };

        let mut template = Self {
            name,
            root: root.to_path_buf(),
            metadata,
            validation_errors: Vec::new(),
        };
        template.validate();
        Ok(template)
    }

    /// Re-runs structural validation, replacing the recorded errors.
    ///
    /// Returns true when the template is usable. Missing assets and a
    /// missing bridge plugin are warn-only.
    pub fn validate(&mut self) -> bool {
        self.validation_errors.clear();

        if !self.root.is_dir() {
            self.validation_errors
                .push(format!("template directory does not exist: {}", self.root.display()));
            return false;
        }

        if find_server_artifact(&self.root, Some(&self.metadata.server_jar)).is_none() {
            self.validation_errors.push(format!(
                "missing {} or equivalent server jar",
                self.metadata.server_jar
            ));
        }

        if !self.root.join("Assets.zip").exists() {
            warn!(template = %self.name, "missing Assets.zip, server may fail to start");
        }

        let plugins = self.root.join(PLUGINS_DIR);
        if plugins.is_dir() {
            let has_bridge = std::fs::read_dir(&plugins)
                .map(|entries| {
                    entries.filter_map(|e| e.ok()).any(|e| {
                        e.file_name()
                            .to_string_lossy()
                            .to_lowercase()
                            .contains("bridge")
                    })
                })
                .unwrap_or(false);
            if !has_bridge {
                warn!(template = %self.name, "no bridge plugin in plugins/");
            }
        }

        self.validation_errors.is_empty()
    }

    /// Clones this template into `dest` with per-instance config overrides.
    ///
    /// Fails when `dest` already exists. The copy preserves relative paths.
    /// Non-empty overrides generate `config.json` in the clone when the
    /// template did not ship one. `startup.sh` is made executable
    /// best-effort.
    ///
    /// The operation is not transactional: on failure the caller is
    /// responsible for deleting `dest`.
    pub fn clone_to(&self, dest: &Path, overrides: &HashMap<String, String>) -> Result<()> {
        if dest.exists() {
            return Err(OrchestratorError::DestinationExists {
                dest: dest.to_path_buf(),
            });
        }

        debug!(template = %self.name, dest = %dest.display(), "cloning template");

        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry.path().strip_prefix(&self.root).map_err(|_| {
                std::io::Error::other(format!(
                    "walked path escapes template root: {}",
                    entry.path().display()
                ))
            })?;
            let target = dest.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                std::fs::copy(entry.path(), &target)?;
            }
        }

        if !overrides.is_empty() {
            self.write_config_overlay(dest, overrides)?;
        }

        let startup = dest.join(STARTUP_SCRIPT);
        if startup.exists() {
            if let Err(e) = make_executable(&startup) {
                warn!(template = %self.name, error = %e, "could not make startup.sh executable");
            }
        }

        info!(template = %self.name, dest = %dest.display(), "cloned template");
        Ok(())
    }

    /// Generates the per-instance `config.json` when the template shipped none.
    fn write_config_overlay(&self, dest: &Path, overrides: &HashMap<String, String>) -> Result<()> {
        let config_path = dest.join(CONFIG_JSON_FILE);
        if config_path.exists() {
            return Ok(());
        }

        let server_name = overrides
            .get(OVERRIDE_SERVER_ID)
            .map(String::as_str)
            .unwrap_or(&self.name);
        let max_players: u32 = overrides
            .get(OVERRIDE_MAX_PLAYERS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let document = serde_json::json!({
            "Version": 3,
            "ServerName": server_name,
            "MOTD": "",
            "Password": "",
            "MaxPlayers": max_players,
            "MaxViewRadius": 32,
            "Defaults": {
                "World": "default",
                "GameMode": "Adventure",
            },
            "ConnectionTimeouts": { "JoinTimeouts": {} },
            "RateLimit": {},
            "Modules": {},
            "LogLevels": {},
            "Mods": {},
            "DisplayTmpTagsInStrings": false,
            "PlayerStorage": { "Type": "Hytale" },
        });
        std::fs::write(&config_path, serde_json::to_string_pretty(&document)?)?;
        Ok(())
    }

    /// Template name (directory basename).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest metadata with defaults applied.
    pub fn metadata(&self) -> &TemplateMetadata {
        &self.metadata
    }

    /// True if the last validation pass recorded no errors.
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    /// Errors recorded by the last validation pass.
    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }

    /// True if the template ships a startup script.
    pub fn has_startup_script(&self) -> bool {
        self.root.join(STARTUP_SCRIPT).exists()
    }

    /// True if the template ships world data.
    pub fn has_universe(&self) -> bool {
        self.root.join(UNIVERSE_DIR).is_dir()
    }

    /// True if the template ships a plugins directory.
    pub fn has_plugins(&self) -> bool {
        self.root.join(PLUGINS_DIR).is_dir()
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Template{{name={}, path={}, valid={}}}",
            self.name,
            self.root.display(),
            self.is_valid()
        )
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
