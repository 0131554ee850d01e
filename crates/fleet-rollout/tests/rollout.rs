//! Coordinator scenarios over an in-memory fleet.

mod common;

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use fleet_backup::{CheckFailure, IntegrityCheck, NonEmpty};
use fleet_cluster::{CommandOutput, CommandRunner, ConnectivityProber, RunError, RunResult};
use fleet_core::{Halt, InstallOutcome, InstallStep, Node, NodeStatus, StepError};
use fleet_rollout::{Interrupt, RolloutError};

use common::{FakeAgent, artifact, cluster, coordinator, plugin_source};

/// Probe runner where only the listed nodes are down.
struct Reachability {
    down: Vec<&'static str>,
}

impl CommandRunner for Reachability {
    async fn run(&self, node: &Node, _script: &str, _stdin: Option<&[u8]>) -> RunResult<CommandOutput> {
        if self.down.iter().any(|down| *down == node.name) {
            return Err(RunError::Unreachable {
                node: node.name.clone(),
                detail: "Connection timed out".to_string(),
            });
        }
        Ok(CommandOutput {
            code: Some(0),
            stdout: Vec::new(),
            stderr: String::new(),
        })
    }
}

fn names(nodes: &[fleet_core::NodeResult]) -> Vec<&str> {
    nodes.iter().map(|r| r.node.name.as_str()).collect()
}

#[tokio::test]
async fn unreachable_node_is_excluded_from_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut targets = cluster();
    targets.push(Node::remote("nodeC", "10.0.0.4"));

    let report = ConnectivityProber::new(Reachability { down: vec!["nodeC"] })
        .probe(&targets)
        .await;
    assert_eq!(report.unreachable_names(), vec!["nodeC"]);

    let coord = coordinator(FakeAgent::new(), &dir);
    let result = coord
        .run(&report.reachable, &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();

    assert_eq!(result.nodes.len(), 3);
    assert!(result.get("nodeC").is_none());
    assert_eq!(result.counts().succeeded, 3);
    assert_eq!(result.counts().total(), report.reachable.len());
    assert!(result.is_complete_success());
}

#[tokio::test]
async fn local_failure_aborts_before_remote_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new().failing("local", InstallStep::Installing);
    let coord = coordinator(agent, &dir);

    // Local node listed last still goes first.
    let mut targets = cluster();
    targets.rotate_left(1);

    let result = coord
        .run(&targets, &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();

    assert_eq!(names(&result.nodes), vec!["local", "nodeA", "nodeB"]);
    assert!(matches!(
        result.get("local").unwrap().status,
        NodeStatus::Finished(InstallOutcome::Failed(StepError::Install(_)))
    ));
    for remote in ["nodeA", "nodeB"] {
        let entry = result.get(remote).unwrap();
        assert_eq!(entry.status, NodeStatus::NotAttempted);
        assert_eq!(entry.attempts, 0);
        assert!(coord.agent().calls(remote).is_empty());
    }
    assert_eq!(result.halt, Some(Halt::LocalNodeFailed));
    assert_eq!(result.counts().total(), 3);
    assert_eq!(coord.agent().staged_count(), 0);
}

#[tokio::test]
async fn remote_failure_does_not_stop_the_rollout() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new().failing("nodeA", InstallStep::Transferring);
    let coord = coordinator(agent, &dir);

    let result = coord
        .run(&cluster(), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();

    assert!(result.get("nodeA").unwrap().status.is_failed());
    assert!(result.get("nodeB").unwrap().status.is_success());
    assert_eq!(result.halt, None);
    assert_eq!(
        result.failure_report(),
        vec!["nodeA: transfer failed: injected transfer failure".to_string()]
    );
}

#[tokio::test]
async fn restart_failure_counts_as_success_variant() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new().failing("nodeB", InstallStep::RestartingServices);
    let coord = coordinator(agent, &dir);
    let art = artifact("1.1.0");

    let result = coord.run(&cluster(), &art, &Interrupt::never()).await.unwrap();

    assert_eq!(
        result.get("nodeA").unwrap().status,
        NodeStatus::Finished(InstallOutcome::Success)
    );
    assert!(matches!(
        result.get("nodeB").unwrap().status,
        NodeStatus::Finished(InstallOutcome::SuccessNeedsRestart(StepError::ServiceRestart(_)))
    ));
    let counts = result.counts();
    assert_eq!((counts.succeeded, counts.failed), (3, 0));
    assert_eq!(coord.agent().installed("nodeB"), Some(art.bytes.clone()));
}

#[tokio::test]
async fn validation_failure_leaves_installed_artifact_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let old = plugin_source("1.0.0");
    let agent = FakeAgent::new()
        .with_installed("nodeA", &old)
        .failing("nodeA", InstallStep::Validating);
    let coord = coordinator(agent, &dir);

    let result = coord
        .run(&cluster(), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();

    assert!(matches!(
        result.get("nodeA").unwrap().status,
        NodeStatus::Finished(InstallOutcome::Failed(StepError::Validation(_)))
    ));
    assert_eq!(coord.agent().installed("nodeA"), Some(old));
    assert!(coord.backups().list_node("nodeA").unwrap().is_empty());
    assert!(!coord.agent().calls("nodeA").contains(&"install"));
    assert_eq!(coord.agent().staged_count(), 0);
}

#[tokio::test]
async fn existing_artifact_is_backed_up_with_replaced_version() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new().with_installed("nodeA", &plugin_source("1.0.0"));
    let coord = coordinator(agent, &dir);

    coord
        .run(&cluster(), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();

    let backups = coord.backups().list().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].node, "nodeA");
    assert_eq!(backups[0].version_label, "1.0.0");
    // Nodes with nothing installed skip the backup step.
    assert!(coord.backups().list_node("nodeB").unwrap().is_empty());
}

#[tokio::test]
async fn backup_failure_blocks_the_install() {
    let dir = tempfile::tempdir().unwrap();
    let old = plugin_source("1.0.0");
    let agent = FakeAgent::new().with_installed("nodeA", &old);
    let coord = coordinator(agent, &dir);
    // A plain file where nodeA's backup directory should go.
    std::fs::write(coord.backups().root().join("nodeA"), b"in the way").unwrap();

    let result = coord
        .run(&cluster(), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();

    assert!(matches!(
        result.get("nodeA").unwrap().status,
        NodeStatus::Finished(InstallOutcome::Failed(StepError::Backup(_)))
    ));
    assert_eq!(coord.agent().installed("nodeA"), Some(old));
    assert!(result.get("nodeB").unwrap().status.is_success());
}

#[tokio::test]
async fn checksum_mismatch_after_install_fails() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new().corrupting("nodeB");
    let coord = coordinator(agent, &dir);

    let result = coord
        .run(&cluster(), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();

    assert!(matches!(
        result.get("nodeB").unwrap().status,
        NodeStatus::Finished(InstallOutcome::Failed(StepError::Install(_)))
    ));
    assert!(!coord.agent().calls("nodeB").contains(&"restart"));
}

#[tokio::test]
async fn rerun_reinstalls_already_current_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let coord = coordinator(FakeAgent::new(), &dir);
    let art = artifact("1.1.0");

    coord.run(&cluster(), &art, &Interrupt::never()).await.unwrap();
    coord.run(&cluster(), &art, &Interrupt::never()).await.unwrap();

    let stages = coord
        .agent()
        .calls("nodeA")
        .into_iter()
        .filter(|op| *op == "stage")
        .count();
    assert_eq!(stages, 2);
    // The second run backed up the copy installed by the first.
    assert_eq!(coord.backups().list_node("nodeA").unwrap().len(), 1);
}

#[tokio::test]
async fn retry_pass_only_touches_failed_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new()
        .failing_times("nodeA", InstallStep::Transferring, 1)
        .failing("nodeB", InstallStep::Installing);
    let coord = coordinator(agent, &dir);
    let art = artifact("1.1.0");

    let first = coord.run(&cluster(), &art, &Interrupt::never()).await.unwrap();
    assert_eq!(first.counts().failed, 2);
    let local_calls = coord.agent().calls("local").len();

    let second = coord.retry(&first, &art, &Interrupt::never()).await.unwrap();

    assert_eq!(coord.agent().calls("local").len(), local_calls);
    assert_eq!(second.nodes.len(), first.nodes.len());
    assert!(second.get("nodeA").unwrap().status.is_success());
    assert!(second.get("nodeB").unwrap().status.is_failed());
    assert_eq!(second.get("nodeA").unwrap().attempts, 2);
    assert_eq!(second.get("nodeB").unwrap().attempts, 2);
    assert_eq!(second.get("local").unwrap().attempts, 1);

    let ok_before: HashSet<_> = first.succeeded().map(|r| r.node.name.clone()).collect();
    let ok_after: HashSet<_> = second.succeeded().map(|r| r.node.name.clone()).collect();
    let failed_after: HashSet<_> = second.failed().map(|r| r.node.name.clone()).collect();
    assert!(ok_after.is_superset(&ok_before));
    assert!(ok_after.is_disjoint(&failed_after));

    // Retrying a clean result is a no-op.
    let third = coord.retry(&second, &art, &Interrupt::never()).await.unwrap();
    assert_eq!(third.get("nodeA").unwrap().attempts, 2);
    assert_eq!(third.get("nodeB").unwrap().attempts, 3);
}

#[tokio::test]
async fn retry_rejects_a_different_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let coord = coordinator(FakeAgent::new(), &dir);
    let first = coord
        .run(&cluster(), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();

    let err = coord
        .retry(&first, &artifact("1.2.0"), &Interrupt::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::VersionMismatch { .. }));
}

#[tokio::test]
async fn interrupt_marks_in_flight_node_and_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new().hanging("nodeB");
    let coord = coordinator(agent, &dir).with_progress_interval(Duration::from_millis(10));
    let mut targets = cluster();
    targets.push(Node::remote("nodeC", "10.0.0.4"));

    let (handle, interrupt) = Interrupt::pair();
    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.trigger();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        coord.run(&targets, &artifact("1.1.0"), &interrupt),
    )
    .await
    .expect("rollout should stop on interrupt")
    .unwrap();
    trigger.await.unwrap();

    assert!(result.get("local").unwrap().status.is_success());
    assert!(result.get("nodeA").unwrap().status.is_success());
    assert_eq!(result.get("nodeB").unwrap().status, NodeStatus::Interrupted);
    assert_eq!(result.get("nodeC").unwrap().status, NodeStatus::NotAttempted);
    assert_eq!(result.halt, Some(Halt::Interrupted));
    assert_eq!(result.counts().skipped, 2);
    assert_eq!(result.counts().total(), targets.len());
    assert!(coord.agent().calls("nodeB").contains(&"discard"));
    assert!(coord.agent().calls("nodeC").is_empty());
    assert_eq!(coord.agent().staged_count(), 0);
}

#[tokio::test]
async fn interrupt_during_install_discards_the_staged_file() {
    let dir = tempfile::tempdir().unwrap();
    let old = plugin_source("1.0.0");
    let agent = FakeAgent::new()
        .with_installed("nodeB", &old)
        .hanging_in_install("nodeB");
    let coord = coordinator(agent, &dir);

    let (handle, interrupt) = Interrupt::pair();
    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.trigger();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        coord.run(&cluster(), &artifact("1.1.0"), &interrupt),
    )
    .await
    .expect("rollout should stop on interrupt")
    .unwrap();
    trigger.await.unwrap();

    assert_eq!(result.get("nodeB").unwrap().status, NodeStatus::Interrupted);
    assert_eq!(result.halt, Some(Halt::Interrupted));
    let calls = coord.agent().calls("nodeB");
    assert_eq!(calls.last(), Some(&"discard"));
    assert!(calls.contains(&"install"));
    assert_eq!(coord.agent().staged_count(), 0);
    assert_eq!(coord.agent().installed("nodeB"), Some(old));
}

#[tokio::test]
async fn interrupt_during_retry_pass() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new()
        .failing_times("nodeA", InstallStep::Transferring, 1)
        .hanging_in_install("nodeA");
    let coord = coordinator(agent, &dir);
    let art = artifact("1.1.0");

    let first = coord.run(&cluster(), &art, &Interrupt::never()).await.unwrap();
    assert!(first.get("nodeA").unwrap().status.is_failed());

    let (handle, interrupt) = Interrupt::pair();
    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.trigger();
    });

    let second = tokio::time::timeout(Duration::from_secs(5), coord.retry(&first, &art, &interrupt))
        .await
        .expect("retry should stop on interrupt")
        .unwrap();
    trigger.await.unwrap();

    assert_eq!(second.get("nodeA").unwrap().status, NodeStatus::Interrupted);
    assert_eq!(second.get("nodeA").unwrap().attempts, 2);
    assert!(second.get("local").unwrap().status.is_success());
    assert!(second.get("nodeB").unwrap().status.is_success());
    assert_eq!(second.halt, Some(Halt::Interrupted));
    assert_eq!(second.nodes.len(), first.nodes.len());
    assert!(coord.agent().calls("nodeA").contains(&"discard"));
    assert_eq!(coord.agent().staged_count(), 0);
    assert_eq!(coord.agent().installed("nodeA"), None);
}

/// Integrity check that never finishes.
struct Stuck;

impl IntegrityCheck for Stuck {
    async fn check(&self, _path: &Path, _bytes: &[u8]) -> Result<(), CheckFailure> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn interrupt_while_validating_rollback_leaves_node_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let old = plugin_source("1.0.0");
    let agent = FakeAgent::new().with_installed("nodeA", &old);
    let coord = coordinator(agent, &dir);
    let node_a = Node::remote("nodeA", "10.0.0.2");

    coord
        .run(std::slice::from_ref(&node_a), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();
    let backup = coord.backups().latest_for("nodeA").unwrap().unwrap();
    let calls_before = coord.agent().calls("nodeA").len();

    let (handle, interrupt) = Interrupt::pair();
    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.trigger();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        coord.rollback(&node_a, &backup.id, &Stuck, &interrupt),
    )
    .await
    .expect("rollback should stop on interrupt")
    .unwrap();
    trigger.await.unwrap();

    assert_eq!(result.get("nodeA").unwrap().status, NodeStatus::NotAttempted);
    assert_eq!(result.halt, Some(Halt::Interrupted));
    assert_eq!(coord.agent().calls("nodeA").len(), calls_before);
    assert_eq!(coord.agent().installed("nodeA"), Some(plugin_source("1.1.0")));
}

#[tokio::test]
async fn rollback_restores_backup_and_backs_up_current() {
    let dir = tempfile::tempdir().unwrap();
    let old = plugin_source("1.0.0");
    let agent = FakeAgent::new().with_installed("nodeA", &old);
    let coord = coordinator(agent, &dir);
    let node_a = Node::remote("nodeA", "10.0.0.2");

    coord
        .run(std::slice::from_ref(&node_a), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();
    let backup = coord.backups().latest_for("nodeA").unwrap().unwrap();
    assert_eq!(backup.version_label, "1.0.0");

    let result = coord
        .rollback(&node_a, &backup.id, &NonEmpty, &Interrupt::never())
        .await
        .unwrap();

    assert!(result.is_complete_success());
    assert_eq!(result.version, "1.0.0");
    assert_eq!(coord.agent().installed("nodeA"), Some(old));

    let backups = coord.backups().list_node("nodeA").unwrap();
    assert_eq!(backups.len(), 2);
    assert_eq!(backups[0].version_label, "1.1.0");
}

#[tokio::test]
async fn rollback_rejects_another_nodes_backup() {
    let dir = tempfile::tempdir().unwrap();
    let agent = FakeAgent::new().with_installed("nodeA", &plugin_source("1.0.0"));
    let coord = coordinator(agent, &dir);

    coord
        .run(&cluster(), &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap();
    let backup = coord.backups().latest_for("nodeA").unwrap().unwrap();

    let err = coord
        .rollback(
            &Node::remote("nodeB", "10.0.0.3"),
            &backup.id,
            &NonEmpty,
            &Interrupt::never(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::BackupNodeMismatch { .. }));
}

#[tokio::test]
async fn duplicate_targets_are_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let coord = coordinator(FakeAgent::new(), &dir);
    let targets = vec![Node::remote("nodeA", "1"), Node::remote("nodeA", "2")];

    let err = coord
        .run(&targets, &artifact("1.1.0"), &Interrupt::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::DuplicateNode(_)));
    assert!(coord.agent().calls("nodeA").is_empty());
}
