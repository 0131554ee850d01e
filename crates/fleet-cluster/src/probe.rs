//! Connectivity probing.
//!
//! Classifies nodes as reachable or unreachable with one bounded no-op
//! command per remote node. The prober never retries and never drops a
//! node: every input node lands in exactly one of the two lists, and the
//! caller decides whether to continue with only the reachable ones.

use futures::future::join_all;
use tracing::{debug, info, warn};

use fleet_core::Node;

use crate::runner::CommandRunner;

/// A node that failed its probe, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unreachable {
    pub node: Node,
    pub reason: String,
}

/// Partition of probed nodes. Input order is preserved in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub reachable: Vec<Node>,
    pub unreachable: Vec<Unreachable>,
}

impl ProbeReport {
    pub fn all_reachable(&self) -> bool {
        self.unreachable.is_empty()
    }

    pub fn unreachable_names(&self) -> Vec<&str> {
        self.unreachable.iter().map(|u| u.node.name.as_str()).collect()
    }
}

pub struct ConnectivityProber<R> {
    runner: R,
}

impl<R: CommandRunner> ConnectivityProber<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Probe every remote node concurrently; the local node is reachable
    /// by definition.
    pub async fn probe(&self, nodes: &[Node]) -> ProbeReport {
        let checks = nodes.iter().map(|node| async move {
            if node.is_local {
                return (node, Ok(()));
            }
            let result = match self.runner.run(node, "true", None).await {
                Ok(out) if out.success() => Ok(()),
                Ok(out) => Err(format!(
                    "probe exited with {:?}: {}",
                    out.code,
                    out.stderr.trim()
                )),
                Err(e) => Err(e.to_string()),
            };
            (node, result)
        });

        let mut report = ProbeReport::default();
        for (node, result) in join_all(checks).await {
            match result {
                Ok(()) => {
                    debug!(node = %node.name, "node reachable");
                    report.reachable.push(node.clone());
                }
                Err(reason) => {
                    warn!(node = %node.name, %reason, "node unreachable");
                    report.unreachable.push(Unreachable {
                        node: node.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            reachable = report.reachable.len(),
            unreachable = report.unreachable.len(),
            "connectivity probe finished"
        );
        report
    }
}
