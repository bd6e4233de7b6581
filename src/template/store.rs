//! # Template store: discovery, validation, lookup.
//!
//! Scans the templates root at initialisation and on reload. Each direct
//! sub-directory is a candidate template; invalid candidates are kept out of
//! the published set and logged with their validation errors.
//!
//! ## Rules
//! - Lookup is case-insensitive; the lower-cased directory name is the key.
//! - Published templates are immutable `Arc`s; reload swaps them wholesale.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::template::metadata::{TemplateMetadata, MANIFEST_FILE};
use crate::template::template::Template;

/// Discovers and indexes templates on disk.
pub struct TemplateStore {
    root: PathBuf,
    templates: DashMap<String, Arc<Template>>,
}

impl TemplateStore {
    /// Creates a store rooted at `root`. Call [`reload_all`](Self::reload_all)
    /// (done by `initialize`) before looking anything up.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            templates: DashMap::new(),
        }
    }

    /// Creates the templates root when absent and discovers all templates.
    pub fn initialize(&self, config: &OrchestratorConfig) -> Result<usize> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!(root = %self.root.display(), "created templates directory");
        }
        let loaded = self.reload_all()?;

        // Surface config sections that point at nothing on disk.
        for name in config.templates.keys() {
            if !self.contains(name) {
                warn!(template = %name, "template defined in config but not found on disk");
            }
        }
        Ok(loaded)
    }

    /// Rescans the templates root, replacing the published set.
    ///
    /// Returns the number of valid templates loaded.
    pub fn reload_all(&self) -> Result<usize> {
        self.templates.clear();
        let mut loaded = 0;

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match Template::load(&entry.path()) {
                Ok(template) if template.is_valid() => {
                    self.templates
                        .insert(name.to_lowercase(), Arc::new(template));
                    loaded += 1;
                    info!(template = %name, "loaded template");
                }
                Ok(template) => {
                    warn!(
                        template = %name,
                        errors = ?template.validation_errors(),
                        "template failed validation"
                    );
                }
                Err(e) => {
                    error!(template = %name, error = %e, "failed to load template");
                }
            }
        }

        info!(count = loaded, "template discovery complete");
        Ok(loaded)
    }

    /// Reloads a single template from disk.
    ///
    /// Returns true on success; a missing or invalid directory removes the
    /// template from the published set.
    pub fn reload(&self, name: &str) -> bool {
        let key = name.to_lowercase();
        let path = self.root.join(name);
        if !path.is_dir() {
            self.templates.remove(&key);
            return false;
        }

        match Template::load(&path) {
            Ok(template) if template.is_valid() => {
                self.templates.insert(key, Arc::new(template));
                info!(template = %name, "reloaded template");
                true
            }
            Ok(_) => {
                warn!(template = %name, "template failed validation after reload");
                false
            }
            Err(e) => {
                error!(template = %name, error = %e, "failed to reload template");
                false
            }
        }
    }

    /// Looks up a template by name, case-insensitively.
    pub fn by_name(&self, name: &str) -> Option<Arc<Template>> {
        self.templates
            .get(&name.to_lowercase())
            .map(|t| Arc::clone(&t))
    }

    /// True if a valid template with the given name is published.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(&name.to_lowercase())
    }

    /// All published templates.
    pub fn templates(&self) -> Vec<Arc<Template>> {
        self.templates.iter().map(|t| Arc::clone(&t)).collect()
    }

    /// Names of all published templates (lower-cased keys), sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.iter().map(|t| t.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Validates a template directory without publishing it.
    pub fn validate_path(&self, path: &Path) -> (bool, Vec<String>) {
        if !path.is_dir() {
            return (false, vec![format!("not a directory: {}", path.display())]);
        }
        match Template::load(path) {
            Ok(template) => (template.is_valid(), template.validation_errors().to_vec()),
            Err(e) => (false, vec![format!("failed to load: {e}")]),
        }
    }

    /// Scaffolds a new template directory with a default manifest and
    /// startup script, then publishes it.
    pub fn create(&self, name: &str) -> Result<Arc<Template>> {
        let path = self.root.join(name);
        if path.exists() {
            return Err(OrchestratorError::DestinationExists { dest: path });
        }

        std::fs::create_dir_all(path.join("plugins"))?;
        std::fs::create_dir_all(path.join("universe"))?;

        TemplateMetadata::defaults_for(name).save(&path.join(MANIFEST_FILE))?;

        let startup = "#!/bin/bash\n\
            MEMORY=\"${MEMORY:-2G}\"\n\
            SERVER_JAR=\"${SERVER_JAR:-HytaleServer.jar}\"\n\
            \n\
            exec java -Xms${MEMORY} -Xmx${MEMORY} \\\n\
            \x20   -XX:+UseG1GC \\\n\
            \x20   -XX:+ParallelRefProcEnabled \\\n\
            \x20   -XX:MaxGCPauseMillis=200 \\\n\
            \x20   -jar \"${SERVER_JAR}\" \"$@\"\n";
        std::fs::write(path.join("startup.sh"), startup)?;

        info!(template = %name, "created template scaffold");

        let template = Arc::new(Template::load(&path)?);
        self.templates
            .insert(name.to_lowercase(), Arc::clone(&template));
        Ok(template)
    }

    /// The templates root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_template(names: &[&str]) -> (tempfile::TempDir, TemplateStore) {
        let tmp = tempfile::tempdir().unwrap();
        for name in names {
            let dir = tmp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("HytaleServer.jar"), b"x").unwrap();
        }
        let store = TemplateStore::new(tmp.path());
        store.reload_all().unwrap();
        (tmp, store)
    }

    #[test]
    fn discovery_is_case_insensitive() {
        let (_tmp, store) = store_with_template(&["BedWars"]);
        assert!(store.contains("bedwars"));
        assert!(store.by_name("BEDWARS").is_some());
        assert_eq!(store.names(), vec!["bedwars".to_string()]);
    }

    #[test]
    fn invalid_templates_are_not_published() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let store = TemplateStore::new(tmp.path());
        assert_eq!(store.reload_all().unwrap(), 0);
        assert!(!store.contains("empty"));
    }

    #[test]
    fn reload_drops_removed_template() {
        let (tmp, store) = store_with_template(&["bedwars"]);
        std::fs::remove_dir_all(tmp.path().join("bedwars")).unwrap();
        assert!(!store.reload("bedwars"));
        assert!(!store.contains("bedwars"));
    }

    #[test]
    fn create_scaffolds_and_publishes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path());
        // Scaffold carries no jar yet; load succeeds but invalid templates
        // stay out of reload_all. create() publishes directly.
        let err = store.create("arena").map(|t| t.is_valid());
        assert!(err.is_ok());
        assert!(tmp.path().join("arena/template.yml").is_file());
        assert!(tmp.path().join("arena/startup.sh").is_file());

        let dup = store.create("arena");
        assert!(dup.is_err());
    }
}
