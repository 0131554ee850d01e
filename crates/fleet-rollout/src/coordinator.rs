//! Rollout coordinator — drives the installer across a node set.
//!
//! Nodes are installed one at a time, local node first. A failure on the
//! local node stops the rollout; failures on remote nodes are recorded and
//! the rollout moves on. Every targeted node ends up in the result exactly
//! once, as finished, interrupted, or not attempted.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use fleet_backup::{BackupError, BackupStore, IntegrityCheck};
use fleet_core::{
    Artifact, BackupId, Halt, Node, NodeResult, NodeStatus, Release, RolloutResult, VersionPattern,
};

use crate::agent::NodeAgent;
use crate::installer::NodeInstaller;
use crate::interrupt::Interrupt;
use crate::progress::ProgressTicker;
use crate::retry::{partition_and_retry, run_sequential};

const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(15);

/// Failures of a rollout invocation as a whole. Per-node failures are
/// data in the returned [`RolloutResult`], not errors.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("node {0} is targeted more than once")]
    DuplicateNode(String),

    #[error("more than one targeted node is marked local: {0:?}")]
    MultipleLocalNodes(Vec<String>),

    #[error("artifact {artifact} does not match rollout version {previous}")]
    VersionMismatch { artifact: String, previous: String },

    #[error("backup {id} belongs to node {owner}, not {node}")]
    BackupNodeMismatch {
        id: String,
        owner: String,
        node: String,
    },

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Sequential rollout driver over a [`NodeAgent`].
pub struct Coordinator<A> {
    agent: A,
    backups: BackupStore,
    pattern: VersionPattern,
    progress_interval: Duration,
}

impl<A: NodeAgent> Coordinator<A> {
    pub fn new(agent: A, backups: BackupStore, pattern: VersionPattern) -> Self {
        Self {
            agent,
            backups,
            pattern,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// How often to log progress while a node install is running.
    pub fn with_progress_interval(mut self, every: Duration) -> Self {
        self.progress_interval = every;
        self
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Install `artifact` on every node in `targets`.
    pub async fn run(
        &self,
        targets: &[Node],
        artifact: &Artifact,
        interrupt: &Interrupt,
    ) -> Result<RolloutResult, RolloutError> {
        let ordered = order_targets(targets)?;
        info!(
            version = %artifact.version(),
            nodes = ordered.len(),
            sha256 = %artifact.sha256,
            "starting rollout"
        );

        let pass = run_sequential(ordered, |node: Node| async move {
            if interrupt.is_triggered() {
                return ControlFlow::Break(NodeStatus::NotAttempted);
            }
            let status = self.install_one(&node, artifact, interrupt).await;
            self.next_step(&node, status)
        })
        .await;

        let halted = pass.halted;
        let mut nodes: Vec<NodeResult> = pass
            .done
            .into_iter()
            .map(|(node, status)| NodeResult {
                attempts: attempted(&status),
                node,
                status,
            })
            .collect();
        nodes.extend(pass.remaining.into_iter().map(|node| NodeResult {
            node,
            status: NodeStatus::NotAttempted,
            attempts: 0,
        }));

        let result = RolloutResult::new(artifact.version(), nodes, self.halt(halted, interrupt));
        log_summary(&result);
        Ok(result)
    }

    /// One explicit retry pass over the nodes that failed in `previous`.
    ///
    /// Nodes are re-validated and re-installed from scratch; the returned
    /// result carries every node of `previous`, with retried nodes updated
    /// and their attempt counts incremented.
    pub async fn retry(
        &self,
        previous: &RolloutResult,
        artifact: &Artifact,
        interrupt: &Interrupt,
    ) -> Result<RolloutResult, RolloutError> {
        if previous.version != artifact.version() {
            return Err(RolloutError::VersionMismatch {
                artifact: artifact.version().to_string(),
                previous: previous.version.clone(),
            });
        }

        let failed = previous.failed().count();
        info!(version = %artifact.version(), failed, "starting retry pass");

        let entries: Vec<(Node, NodeResult)> = previous
            .nodes
            .iter()
            .map(|r| (r.node.clone(), r.clone()))
            .collect();

        let retried = partition_and_retry(
            entries,
            |prior: &NodeResult| prior.status.is_failed(),
            |node: Node| async move {
                let prior = previous.get(&node.name).map_or(0, |r| r.attempts);
                if interrupt.is_triggered() {
                    // Not reached: keep the previous result untouched.
                    return match previous.get(&node.name) {
                        Some(r) => ControlFlow::Break(r.clone()),
                        None => ControlFlow::Break(NodeResult {
                            node,
                            status: NodeStatus::NotAttempted,
                            attempts: prior,
                        }),
                    };
                }
                let status = self.install_one(&node, artifact, interrupt).await;
                let attempts = prior + attempted(&status);
                match self.next_step(&node, status) {
                    ControlFlow::Continue(status) => ControlFlow::Continue(NodeResult {
                        node,
                        status,
                        attempts,
                    }),
                    ControlFlow::Break(status) => ControlFlow::Break(NodeResult {
                        node,
                        status,
                        attempts,
                    }),
                }
            },
        )
        .await;

        info!(retried = retried.retried, "retry pass finished");
        let nodes = retried.results.into_iter().map(|(_, r)| r).collect();
        let result = RolloutResult::new(
            artifact.version(),
            nodes,
            self.halt(retried.halted, interrupt),
        );
        log_summary(&result);
        Ok(result)
    }

    /// Put a stored backup back on `node`.
    ///
    /// The backup is re-validated by `check` and then installed through the
    /// normal state machine, so whatever is installed now gets backed up
    /// first and the rollback itself can be undone.
    ///
    /// An interrupt while the backup is being validated leaves the node
    /// untouched and reports it as not attempted.
    pub async fn rollback<C: IntegrityCheck>(
        &self,
        node: &Node,
        id: &BackupId,
        check: &C,
        interrupt: &Interrupt,
    ) -> Result<RolloutResult, RolloutError> {
        let backup = self.backups.get(id)?;
        if backup.node != node.name {
            return Err(RolloutError::BackupNodeMismatch {
                id: id.to_string(),
                owner: backup.node,
                node: node.name.clone(),
            });
        }
        let bytes = tokio::select! {
            bytes = self.backups.restore(id, check) => bytes?,
            _ = interrupt.wait() => {
                warn!(node = %node.name, %id, "interrupted while validating backup");
                let skipped = NodeResult {
                    node: node.clone(),
                    status: NodeStatus::NotAttempted,
                    attempts: 0,
                };
                return Ok(RolloutResult::new(
                    &backup.version_label,
                    vec![skipped],
                    Some(Halt::Interrupted),
                ));
            }
        };
        info!(node = %node.name, %id, version = %backup.version_label, "rolling back");

        let artifact = Artifact::new(
            Release {
                version: backup.version_label,
                download_locator: backup.location,
                is_prerelease: false,
            },
            bytes,
        );
        self.run(std::slice::from_ref(node), &artifact, interrupt)
            .await
    }

    /// Run the installer on one node, racing it against the interrupt.
    async fn install_one(&self, node: &Node, artifact: &Artifact, interrupt: &Interrupt) -> NodeStatus {
        info!(node = %node, version = %artifact.version(), "installing");
        let ticker = ProgressTicker::start(format!("install on {}", node.name), self.progress_interval);
        let installer = NodeInstaller::new(&self.agent, &self.backups, &self.pattern);

        let status = tokio::select! {
            report = installer.install(node, artifact) => NodeStatus::Finished(report.outcome),
            _ = interrupt.wait() => {
                warn!(node = %node.name, "interrupted; discarding staged artifact");
                let staged = self.agent.staged_path(artifact);
                if let Err(e) = self.agent.discard(node, &staged).await {
                    warn!(node = %node.name, %staged, error = %e, "cleanup after interrupt failed");
                }
                NodeStatus::Interrupted
            }
        };

        ticker.finish().await;
        status
    }

    /// Decide whether the pass continues after `node` reached `status`.
    fn next_step(&self, node: &Node, status: NodeStatus) -> ControlFlow<NodeStatus, NodeStatus> {
        if status == NodeStatus::Interrupted {
            return ControlFlow::Break(status);
        }
        if node.is_local && status.is_failed() {
            warn!(node = %node.name, "local node failed; aborting rollout");
            return ControlFlow::Break(status);
        }
        ControlFlow::Continue(status)
    }

    fn halt(&self, halted: bool, interrupt: &Interrupt) -> Option<Halt> {
        match (halted, interrupt.is_triggered()) {
            (false, _) => None,
            (true, true) => Some(Halt::Interrupted),
            (true, false) => Some(Halt::LocalNodeFailed),
        }
    }
}

/// Reject duplicate names and move the local node to the front, keeping
/// the relative order of the rest.
fn order_targets(targets: &[Node]) -> Result<Vec<Node>, RolloutError> {
    let mut seen = HashSet::new();
    for node in targets {
        if !seen.insert(node.name.as_str()) {
            return Err(RolloutError::DuplicateNode(node.name.clone()));
        }
    }

    let (local, remote): (Vec<Node>, Vec<Node>) =
        targets.iter().cloned().partition(|n| n.is_local);
    if local.len() > 1 {
        return Err(RolloutError::MultipleLocalNodes(
            local.into_iter().map(|n| n.name).collect(),
        ));
    }
    Ok(local.into_iter().chain(remote).collect())
}

fn attempted(status: &NodeStatus) -> u32 {
    match status {
        NodeStatus::NotAttempted => 0,
        NodeStatus::Finished(_) | NodeStatus::Interrupted => 1,
    }
}

fn log_summary(result: &RolloutResult) {
    let counts = result.counts();
    if counts.failed == 0 && result.halt.is_none() {
        info!(version = %result.version, %counts, "rollout finished");
    } else {
        warn!(version = %result.version, %counts, halt = ?result.halt, "rollout finished with problems");
        for line in result.failure_report() {
            warn!(failure = %line, "node failed");
        }
    }
}
