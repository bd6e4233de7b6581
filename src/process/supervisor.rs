//! # Process supervisor: spawn, observe, terminate backend processes.
//!
//! Spawns child processes with the constructed command line, attaches the
//! log pipeline, keeps a liveness probe per child, and terminates children
//! gracefully or forcibly.
//!
//! ## Command line
//! ```text
//! <java> -Xms<mem> -Xmx<mem> -XX:+UseG1GC -XX:+ParallelRefProcEnabled
//!        -XX:MaxGCPauseMillis=200 [<jvm_args>...] -jar <jar> [<server_args>...]
//! ```
//!
//! ## Log pipeline
//! ```text
//! child stdout ─┐
//!               ├─► mpsc ─► writer task ─► <logs>/{kind}/<id>.log
//! child stderr ─┘                      └─► ProcessHandle ring buffer
//! ```
//!
//! ## Rules
//! - Failure to start is an immediate error; nothing is tracked.
//! - A child dying mid-life is observed (exit code latched by the 5 s
//!   probe), never retried here; propagation is the instance supervisor's job.
//! - `kill` removes the handle from the tracked set on success, on both the
//!   graceful and the forced path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::instance::ServerKind;
use crate::process::handle::{ProcessHandle, ProcessMetrics};
use crate::template::find_server_artifact;

/// Interval of the per-child liveness probe.
const LIVENESS_PROBE_INTERVAL: Duration = Duration::from_secs(5);
/// Cap on waiting for a force-killed child to be reaped.
const FORCE_KILL_WAIT: Duration = Duration::from_secs(5);
/// Per-child grace during supervisor shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Everything needed to spawn one backend server process.
pub struct SpawnCommand {
    /// Unique server identifier; must not already be tracked.
    pub server_id: String,
    /// Working directory; must exist.
    pub working_dir: PathBuf,
    /// JVM heap size, e.g. "2G".
    pub memory: String,
    /// Server jar filename; resolution falls back to directory scanning.
    pub exec_file: Option<String>,
    /// Extra JVM arguments inserted before `-jar`.
    pub jvm_args: Vec<String>,
    /// Server arguments appended after the jar.
    pub server_args: Vec<String>,
    /// Environment overlay; caller wins over injected variables.
    pub environment: HashMap<String, String>,
    /// Decides the log sub-directory.
    pub kind: ServerKind,
}

/// A tracked child: the shared handle plus its monitor's cancellation token.
struct Tracked {
    handle: Arc<ProcessHandle>,
    monitor: CancellationToken,
}

/// Spawns and supervises backend server processes.
pub struct ProcessSupervisor {
    processes: DashMap<String, Tracked>,
    logs_root: PathBuf,
    java_path: String,
    shutting_down: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    /// Creates a supervisor writing logs under `logs_root` and launching
    /// children with the given Java executable.
    pub fn new(logs_root: impl Into<PathBuf>, java_path: impl Into<String>) -> Self {
        Self {
            processes: DashMap::new(),
            logs_root: logs_root.into(),
            java_path: java_path.into(),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates the log directory tree.
    pub fn initialize(&self) -> Result<()> {
        std::fs::create_dir_all(self.logs_root.join("dynamic"))?;
        std::fs::create_dir_all(self.logs_root.join("static"))?;
        Ok(())
    }

    /// Spawns a backend server process.
    pub async fn spawn(&self, cmd: SpawnCommand) -> Result<Arc<ProcessHandle>> {
        if self.processes.contains_key(&cmd.server_id) {
            return Err(OrchestratorError::ServerAlreadyExists {
                server_id: cmd.server_id,
            });
        }
        if !cmd.working_dir.is_dir() {
            return Err(OrchestratorError::WorkingDirMissing {
                dir: cmd.working_dir,
            });
        }

        let preferred = cmd.exec_file.as_deref().unwrap_or("HytaleServer.jar");
        let jar = find_server_artifact(&cmd.working_dir, Some(preferred)).ok_or_else(|| {
            OrchestratorError::NoServerArtifact {
                dir: cmd.working_dir.clone(),
            }
        })?;

        let mut command = Command::new(&self.java_path);
        command
            .arg(format!("-Xms{}", cmd.memory))
            .arg(format!("-Xmx{}", cmd.memory))
            .arg("-XX:+UseG1GC")
            .arg("-XX:+ParallelRefProcEnabled")
            .arg("-XX:MaxGCPauseMillis=200")
            .args(&cmd.jvm_args)
            .arg("-jar")
            .arg(&jar)
            .args(&cmd.server_args);

        command
            .env("NUMDRASSL_SERVER_ID", &cmd.server_id)
            .env("MEMORY", &cmd.memory)
            .envs(&cmd.environment);

        info!(server = %cmd.server_id, dir = %cmd.working_dir.display(), "spawning server");
        debug!(server = %cmd.server_id, jar = %jar, args = ?cmd.server_args, "spawn command");

        self.launch(command, cmd.server_id, cmd.working_dir, cmd.kind).await
    }

    /// Spawns a server through its startup script instead of the jar.
    pub async fn spawn_with_script(
        &self,
        server_id: impl Into<String>,
        working_dir: PathBuf,
        script: PathBuf,
        environment: HashMap<String, String>,
        kind: ServerKind,
    ) -> Result<Arc<ProcessHandle>> {
        let server_id = server_id.into();
        if self.processes.contains_key(&server_id) {
            return Err(OrchestratorError::ServerAlreadyExists { server_id });
        }
        if !script.exists() {
            return Err(OrchestratorError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("startup script not found: {}", script.display()),
            )));
        }

        let mut command = Command::new("/bin/bash");
        command.arg(&script);
        command
            .env("NUMDRASSL_SERVER_ID", &server_id)
            .envs(&environment);

        info!(server = %server_id, script = %script.display(), "spawning server via script");
        self.launch(command, server_id, working_dir, kind).await
    }

    /// Common tail of the spawn paths: process creation, log pipeline,
    /// liveness probe, tracking.
    async fn launch(
        &self,
        mut command: Command,
        server_id: String,
        working_dir: PathBuf,
        kind: ServerKind,
    ) -> Result<Arc<ProcessHandle>> {
        command
            .current_dir(&working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;
        let pid = child.id().ok_or_else(|| {
            OrchestratorError::Io(std::io::Error::other("child exited before pid was read"))
        })?;

        let log_file = self
            .logs_root
            .join(kind.log_dir())
            .join(format!("{server_id}.log"));

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let handle = Arc::new(ProcessHandle::new(
            server_id.clone(),
            pid,
            child,
            working_dir,
            log_file.clone(),
        ));

        self.start_log_capture(&handle, stdout, stderr, log_file).await?;
        let monitor = self.start_liveness_probe(&handle);

        self.processes.insert(
            server_id.clone(),
            Tracked {
                handle: Arc::clone(&handle),
                monitor,
            },
        );

        info!(server = %server_id, pid, "server started");
        Ok(handle)
    }

    /// Wires child output into the log file and the ring buffer.
    ///
    /// One pump task per pipe feeds a single writer task, which is the only
    /// producer into the file and the buffer.
    async fn start_log_capture(
        &self,
        handle: &Arc<ProcessHandle>,
        stdout: Option<tokio::process::ChildStdout>,
        stderr: Option<tokio::process::ChildStderr>,
        log_file: PathBuf,
    ) -> Result<()> {
        let file = tokio::fs::File::create(&log_file).await?;
        let (tx, mut rx) = mpsc::channel::<String>(256);

        if let Some(out) = stdout {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(err) = stderr {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let writer_handle = Arc::clone(handle);
        let server_id = handle.server_id().to_string();
        let shutting_down = Arc::clone(&self.shutting_down);
        tokio::spawn(async move {
            let mut file = tokio::io::BufWriter::new(file);
            while let Some(line) = rx.recv().await {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    if !shutting_down.load(Ordering::Relaxed) {
                        error!(server = %server_id, error = %e, "error capturing logs");
                    }
                    break;
                }
                let _ = file.write_all(b"\n").await;
                let _ = file.flush().await;
                writer_handle.push_line(line);
            }
            let _ = file.flush().await;
        });

        Ok(())
    }

    /// Probes the child every 5 s, latching the exit code when it dies.
    /// The probe survives until `kill` cancels it.
    fn start_liveness_probe(&self, handle: &Arc<ProcessHandle>) -> CancellationToken {
        let token = CancellationToken::new();
        let probe_token = token.clone();
        let handle = Arc::clone(handle);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIVENESS_PROBE_INTERVAL);
            interval.tick().await;
            let mut reported = false;
            loop {
                tokio::select! {
                    _ = probe_token.cancelled() => break,
                    _ = interval.tick() => {
                        handle.try_reap();
                        if let Some(code) = handle.exit_code() {
                            if !reported {
                                warn!(server = %handle.server_id(), code, "server exited");
                                reported = true;
                            }
                        }
                    }
                }
            }
        });

        token
    }

    /// Terminates a tracked child.
    ///
    /// Graceful: signal termination, wait up to `deadline`; on timeout
    /// escalate to a forced kill with a 5 s cap. Forced: kill immediately.
    /// Returns false when no process is tracked for the id.
    pub async fn kill(&self, server_id: &str, graceful: bool, deadline: Duration) -> bool {
        let handle = match self.processes.get(server_id) {
            Some(tracked) => Arc::clone(&tracked.handle),
            None => {
                warn!(server = %server_id, "no process found for kill");
                return false;
            }
        };

        if !handle.is_alive() {
            self.untrack(server_id);
            return true;
        }

        if graceful {
            info!(server = %server_id, "requesting graceful shutdown");
            send_termination_signal(handle.pid());

            let exited = {
                let mut child = handle.child.lock().await;
                matches!(
                    tokio::time::timeout(deadline, child.wait()).await,
                    Ok(Ok(_))
                )
            };
            if exited {
                handle.try_reap();
                info!(server = %server_id, "server shut down gracefully");
                self.untrack(server_id);
                return true;
            }
            warn!(server = %server_id, "server did not shut down gracefully, forcing");
        }

        {
            let mut child = handle.child.lock().await;
            let _ = child.start_kill();
            let _ = tokio::time::timeout(FORCE_KILL_WAIT, child.wait()).await;
        }
        handle.try_reap();
        self.untrack(server_id);
        info!(server = %server_id, "server forcibly terminated");
        true
    }

    /// Drops a child from the tracked set and stops its liveness probe.
    fn untrack(&self, server_id: &str) {
        if let Some((_, tracked)) = self.processes.remove(server_id) {
            tracked.monitor.cancel();
        }
    }

    /// True while the tracked child is running.
    pub fn is_alive(&self, server_id: &str) -> bool {
        self.processes
            .get(server_id)
            .map(|t| t.handle.is_alive())
            .unwrap_or(false)
    }

    /// The tracked handle, if any.
    pub fn get(&self, server_id: &str) -> Option<Arc<ProcessHandle>> {
        self.processes.get(server_id).map(|t| Arc::clone(&t.handle))
    }

    /// The most recent `count` captured lines for a tracked child.
    pub fn recent_logs(&self, server_id: &str, count: usize) -> Vec<String> {
        self.processes
            .get(server_id)
            .map(|t| t.handle.recent_logs(count))
            .unwrap_or_default()
    }

    /// Metrics for a live tracked child.
    pub fn metrics(&self, server_id: &str) -> Option<ProcessMetrics> {
        self.processes
            .get(server_id)
            .filter(|t| t.handle.is_alive())
            .map(|t| t.handle.metrics())
    }

    /// Identifiers of all tracked children.
    pub fn tracked_ids(&self) -> Vec<String> {
        self.processes.iter().map(|t| t.key().clone()).collect()
    }

    /// Number of tracked children.
    pub fn tracked_count(&self) -> usize {
        self.processes.len()
    }

    /// Gracefully kills every tracked child (10 s grace each), forcing the
    /// residue. Errors on this path are logged and swallowed so that every
    /// child is attempted.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        info!("shutting down process supervisor");

        for server_id in self.tracked_ids() {
            self.kill(&server_id, true, SHUTDOWN_GRACE).await;
        }

        info!("process supervisor shut down");
    }
}

/// Asks the child to terminate on its own.
#[cfg(unix)]
fn send_termination_signal(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_termination_signal(_pid: u32) {
    // No cooperative termination signal on this platform; the caller's
    // deadline elapses and the forced path takes over.
}
