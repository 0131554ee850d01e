//! Rollout results — the per-node outcome map returned by a rollout.
//!
//! A `RolloutResult` holds exactly one entry per targeted node, in the
//! order the nodes were processed. It is built once by the coordinator
//! and then only read; a retry pass produces a new value instead of
//! editing the old one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{InstallOutcome, Node};

/// What happened to one targeted node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "outcome", rename_all = "snake_case")]
pub enum NodeStatus {
    /// The installer reached a terminal state.
    Finished(InstallOutcome),
    /// The installer was running when the rollout was interrupted.
    Interrupted,
    /// The rollout stopped before this node was started.
    NotAttempted,
}

impl NodeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeStatus::Finished(o) if o.is_success())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, NodeStatus::Finished(o) if o.is_failed())
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, NodeStatus::Interrupted | NodeStatus::NotAttempted)
    }

    pub fn outcome(&self) -> Option<&InstallOutcome> {
        match self {
            NodeStatus::Finished(o) => Some(o),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node: Node,
    pub status: NodeStatus,
    /// Installer runs made against this node across the initial pass and
    /// any retry passes.
    pub attempts: u32,
}

/// Why a rollout stopped before visiting every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Halt {
    /// The local node failed, so remote nodes were not touched.
    LocalNodeFailed,
    /// The operator interrupted the rollout.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutResult {
    /// Version label of the artifact that was rolled out.
    pub version: String,
    pub nodes: Vec<NodeResult>,
    pub halt: Option<Halt>,
}

impl RolloutResult {
    pub fn new(version: &str, nodes: Vec<NodeResult>, halt: Option<Halt>) -> Self {
        Self {
            version: version.to_string(),
            nodes,
            halt,
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &NodeResult> {
        self.nodes.iter().filter(|r| r.status.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &NodeResult> {
        self.nodes.iter().filter(|r| r.status.is_failed())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &NodeResult> {
        self.nodes.iter().filter(|r| r.status.is_skipped())
    }

    pub fn counts(&self) -> RolloutCounts {
        RolloutCounts {
            succeeded: self.succeeded().count(),
            failed: self.failed().count(),
            skipped: self.skipped().count(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&NodeResult> {
        self.nodes.iter().find(|r| r.node.name == name)
    }

    pub fn is_complete_success(&self) -> bool {
        self.halt.is_none() && self.nodes.iter().all(|r| r.status.is_success())
    }

    /// One line per failed node with its failure reason.
    pub fn failure_report(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|r| match &r.status {
                NodeStatus::Finished(outcome @ InstallOutcome::Failed(_)) => Some(format!(
                    "{}: {}",
                    r.node.name,
                    outcome.reason().unwrap_or_default()
                )),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RolloutCounts {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

impl fmt::Display for RolloutCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped",
            self.succeeded, self.failed, self.skipped
        )
    }
}
