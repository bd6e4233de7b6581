//! Health surveillance scenarios: crash detection and heartbeat flapping.
//!
//! These tests run with a 1 s health-probe interval and real stub processes,
//! so they lean on generous polling deadlines rather than exact timing.

mod common;

use common::{wait_for, Sandbox};
use fleetvisor::{EventKind, Orchestrator, ServerStatus, SpawnOptions};

fn surveillance_config(sandbox: &Sandbox) -> String {
    format!(
        r#"
javaPath: {java}
processStartTimeoutSeconds: 10
healthCheckIntervalSeconds: 1
templates:
  bedwars:
    portRangeStart: 6100
    portRangeEnd: 6200
"#,
        java = sandbox.ready_stub()
    )
}

#[cfg(unix)]
fn kill_hard(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).expect("send SIGKILL");
}

#[cfg(unix)]
#[tokio::test]
async fn external_crash_is_detected_and_dynamic_dir_reclaimed() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    sandbox.write_config(&surveillance_config(&sandbox));

    let orchestrator = Orchestrator::new(sandbox.root());
    orchestrator.initialize().await.unwrap();

    let instance = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap();
    assert_eq!(instance.status(), ServerStatus::Running);

    let pid = instance.process().expect("running instance has a process").pid();
    kill_hard(pid);

    // The next probe tick flips the instance to Failed.
    let failed = wait_for(5_000, || instance.status() == ServerStatus::Failed).await;
    assert!(failed, "instance never turned Failed");
    assert_eq!(instance.stop_reason().as_deref(), Some("Process died"));

    // The async cleanup reclaims the working directory of the dynamic.
    let reclaimed = wait_for(5_000, || sandbox.dynamic_entries().is_empty()).await;
    assert!(reclaimed, "dynamic working dir was not reclaimed");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn overdue_heartbeat_flips_unhealthy_and_recovers_on_heartbeat() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    sandbox.write_config(&surveillance_config(&sandbox));

    let orchestrator = Orchestrator::new(sandbox.root());
    let mut events = orchestrator.bus().subscribe();
    orchestrator.initialize().await.unwrap();

    let instance = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap();
    let id = instance.server_id().to_string();

    // No heartbeats arrive; after 3 × interval the probe downgrades the
    // instance.
    let unhealthy = wait_for(8_000, || instance.status() == ServerStatus::Unhealthy).await;
    assert!(unhealthy, "instance never turned Unhealthy");

    orchestrator.on_heartbeat(&id).unwrap();
    assert_eq!(instance.status(), ServerStatus::Running);

    let mut saw_downgrade = false;
    let mut saw_recovery = false;
    while let Ok(event) = events.try_recv() {
        if event.kind != EventKind::ServerHealth || event.server_id != id {
            continue;
        }
        if event.current == Some(ServerStatus::Unhealthy) {
            saw_downgrade = true;
        }
        if event.recovered() {
            saw_recovery = true;
            assert_eq!(event.previous, Some(ServerStatus::Unhealthy));
            assert_eq!(event.current, Some(ServerStatus::Running));
        }
    }
    assert!(saw_downgrade, "no ServerHealth downgrade event");
    assert!(saw_recovery, "no ServerHealth recovery event");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn fresh_heartbeats_keep_the_instance_running() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    sandbox.write_config(&surveillance_config(&sandbox));

    let orchestrator = Orchestrator::new(sandbox.root());
    orchestrator.initialize().await.unwrap();

    let instance = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap();
    let id = instance.server_id().to_string();

    // Heartbeat faster than the staleness threshold for a few intervals.
    for _ in 0..4 {
        tokio::time::sleep(std::time::Duration::from_millis(900)).await;
        orchestrator.on_heartbeat(&id).unwrap();
    }
    assert_eq!(instance.status(), ServerStatus::Running);

    orchestrator.shutdown().await;
}
