#![allow(dead_code)]

//! Shared sandbox for orchestrator integration tests.
//!
//! Builds a throwaway `servers/` layout in a temp directory and provides
//! stub "server" executables: one that announces readiness and sleeps, one
//! that exits immediately.

use std::path::{Path, PathBuf};

/// Stub that prints a readiness marker and then idles.
pub const READY_SCRIPT: &str = "#!/bin/sh\necho \"Server started\"\nexec sleep 300\n";
/// Stub that dies straight away.
pub const CRASH_SCRIPT: &str = "#!/bin/sh\necho \"boom\"\nexit 1\n";

pub struct Sandbox {
    _dir: tempfile::TempDir,
    root: PathBuf,
    stub_dir: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let root = dir.path().join("servers");
        let stub_dir = dir.path().join("stubs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&stub_dir).unwrap();
        let sandbox = Self {
            _dir: dir,
            root,
            stub_dir,
        };
        sandbox.write_stub("ready-server.sh", READY_SCRIPT);
        sandbox.write_stub("crash-server.sh", CRASH_SCRIPT);
        sandbox
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes (or rewrites) an executable stub and returns its path.
    pub fn write_stub(&self, name: &str, content: &str) -> PathBuf {
        let path = self.stub_dir.join(name);
        std::fs::write(&path, content).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    pub fn ready_stub(&self) -> String {
        self.stub_dir.join("ready-server.sh").display().to_string()
    }

    pub fn crash_stub(&self) -> String {
        self.stub_dir.join("crash-server.sh").display().to_string()
    }

    /// Writes `servers/config.yml` verbatim.
    pub fn write_config(&self, yaml: &str) {
        std::fs::write(self.root.join("config.yml"), yaml).unwrap();
    }

    /// Creates a template directory with a placeholder server jar.
    pub fn add_template(&self, name: &str) {
        let dir = self.root.join("templates").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("HytaleServer.jar"), b"jar").unwrap();
    }

    /// Creates a static server working directory with a placeholder jar.
    pub fn add_static_dir(&self, server_id: &str) {
        let dir = self.root.join("static").join(server_id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("HytaleServer.jar"), b"jar").unwrap();
    }

    pub fn dynamic_dir(&self) -> PathBuf {
        self.root.join("dynamic")
    }

    pub fn static_dir(&self, server_id: &str) -> PathBuf {
        self.root.join("static").join(server_id)
    }

    /// Names of the entries currently under `servers/dynamic/`.
    pub fn dynamic_entries(&self) -> Vec<String> {
        match std::fs::read_dir(self.dynamic_dir()) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Polls `predicate` every 100 ms until it holds or `timeout_ms` elapses.
pub async fn wait_for(timeout_ms: u64, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    predicate()
}
