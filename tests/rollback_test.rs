//! Failure-path tests: every resource an aborted spawn acquired must be
//! released — port, cloned directory, process, registry entry.

mod common;

use common::{Sandbox, READY_SCRIPT};
use fleetvisor::{Orchestrator, SpawnOptions};

#[tokio::test]
async fn startup_with_dead_child_rolls_back_completely() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    sandbox.write_config(&format!(
        r#"
javaPath: {java}
processStartTimeoutSeconds: 2
templates:
  bedwars:
    portRangeStart: 6100
    portRangeEnd: 6200
"#,
        java = sandbox.crash_stub()
    ));

    let orchestrator = Orchestrator::new(sandbox.root());
    orchestrator.initialize().await.unwrap();

    let err = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err.as_label(),
            "exited_during_startup" | "startup_timeout"
        ),
        "unexpected error: {err}"
    );
    assert!(!err.is_precondition());

    // The clone is gone and nothing was registered.
    assert!(sandbox.dynamic_entries().is_empty());
    assert!(orchestrator.servers().unwrap().is_empty());

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn failed_spawn_releases_its_port() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    // One single port in the range: a leak would make the retry fail.
    sandbox.write_config(&format!(
        r#"
javaPath: {java}
processStartTimeoutSeconds: 2
templates:
  bedwars:
    portRangeStart: 6150
    portRangeEnd: 6150
"#,
        java = sandbox.crash_stub()
    ));

    let orchestrator = Orchestrator::new(sandbox.root());
    orchestrator.initialize().await.unwrap();

    orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap_err();

    // Swap the crashing stub for a healthy one, keeping the same path the
    // config points at.
    sandbox.write_stub("crash-server.sh", READY_SCRIPT);

    let instance = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap();
    assert_eq!(instance.port(), 6150);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn duplicate_server_id_is_rejected_before_any_resource_is_taken() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    sandbox.write_config(&format!(
        r#"
javaPath: {java}
processStartTimeoutSeconds: 10
templates:
  bedwars:
    portRangeStart: 6100
    portRangeEnd: 6200
"#,
        java = sandbox.ready_stub()
    ));

    let orchestrator = Orchestrator::new(sandbox.root());
    orchestrator.initialize().await.unwrap();

    orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new().with_server_id("arena"))
        .await
        .unwrap();

    let err = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new().with_server_id("arena"))
        .await
        .unwrap_err();
    assert_eq!(err.as_label(), "server_already_exists");
    assert!(err.is_precondition());
    assert_eq!(sandbox.dynamic_entries(), vec!["arena"]);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn spawning_disabled_rejects_before_any_resource_is_taken() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    sandbox.write_config(&format!(
        r#"
javaPath: {java}
dynamicSpawning:
  enabled: false
templates:
  bedwars:
    portRangeStart: 6100
    portRangeEnd: 6200
"#,
        java = sandbox.ready_stub()
    ));

    let orchestrator = Orchestrator::new(sandbox.root());
    orchestrator.initialize().await.unwrap();

    let err = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.as_label(), "spawning_disabled");
    assert!(sandbox.dynamic_entries().is_empty());

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn max_concurrent_ceiling_is_enforced() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    sandbox.write_config(&format!(
        r#"
javaPath: {java}
processStartTimeoutSeconds: 10
dynamicSpawning:
  maxConcurrent: 1
templates:
  bedwars:
    portRangeStart: 6100
    portRangeEnd: 6200
"#,
        java = sandbox.ready_stub()
    ));

    let orchestrator = Orchestrator::new(sandbox.root());
    orchestrator.initialize().await.unwrap();

    orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap();
    let err = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.as_label(), "max_concurrent_reached");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn uninitialized_orchestrator_rejects_intents() {
    let sandbox = Sandbox::new();
    let orchestrator = Orchestrator::new(sandbox.root());

    let err = orchestrator
        .spawn_dynamic("bedwars", SpawnOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.as_label(), "not_initialized");
    assert!(orchestrator.servers().is_err());
    assert!(!orchestrator.is_initialized());
}

#[tokio::test]
async fn leftover_dynamic_dirs_are_purged_on_boot() {
    let sandbox = Sandbox::new();
    sandbox.add_template("bedwars");
    sandbox.write_config(&format!("javaPath: {}\n", sandbox.ready_stub()));

    // Residue from a "previous" orchestrator process.
    let leftover = sandbox.dynamic_dir().join("bedwars-9");
    std::fs::create_dir_all(&leftover).unwrap();
    std::fs::write(leftover.join("HytaleServer.jar"), b"stale").unwrap();

    let orchestrator = Orchestrator::new(sandbox.root());
    orchestrator.initialize().await.unwrap();

    assert!(sandbox.dynamic_entries().is_empty());
    orchestrator.shutdown().await;
}
