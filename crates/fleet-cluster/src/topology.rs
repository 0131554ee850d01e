//! Cluster member discovery.
//!
//! The core only needs `{name, address, is_local}` per member. A topology
//! either comes from the static `[[cluster.nodes]]` list or from a command
//! that prints the member list as JSON, for example:
//!
//! ```json
//! [
//!   {"type": "cluster", "name": "prod", "quorate": 1},
//!   {"type": "node", "name": "pve1", "ip": "10.0.0.1", "local": 1},
//!   {"type": "node", "name": "pve2", "ip": "10.0.0.2", "local": 0}
//! ]
//! ```
//!
//! Entries whose `type` is present and not `node` are ignored.

use std::future::Future;

use serde::Deserialize;
use tracing::debug;

use fleet_core::Node;

use crate::error::{ClusterError, ClusterResult};
use crate::runner::CommandRunner;

/// Resolves the set of cluster members.
pub trait Topology: Send + Sync {
    fn list_members(&self) -> impl Future<Output = ClusterResult<Vec<Node>>> + Send;

    /// The member this process runs on.
    fn current_member(&self) -> impl Future<Output = ClusterResult<Node>> + Send {
        async move {
            let members = self.list_members().await?;
            local_member(&members)
        }
    }
}

/// Pick the single member flagged local.
pub fn local_member(members: &[Node]) -> ClusterResult<Node> {
    let locals: Vec<&Node> = members.iter().filter(|n| n.is_local).collect();
    match locals.as_slice() {
        [one] => Ok((*one).clone()),
        [] => Err(ClusterError::NoLocalMember),
        many => Err(ClusterError::MultipleLocalMembers(
            many.iter().map(|n| n.name.clone()).collect(),
        )),
    }
}

/// A fixed member list, typically from `fleet.toml`.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    nodes: Vec<Node>,
}

impl StaticTopology {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }
}

impl Topology for StaticTopology {
    async fn list_members(&self) -> ClusterResult<Vec<Node>> {
        Ok(self.nodes.clone())
    }
}

/// Members read from the JSON output of a command run on the local node.
pub struct CommandTopology<R> {
    runner: R,
    command: String,
    /// Overrides the `local` flag of the command output when set.
    local_node: Option<String>,
}

impl<R: CommandRunner> CommandTopology<R> {
    pub fn new(runner: R, command: &str, local_node: Option<&str>) -> Self {
        Self {
            runner,
            command: command.to_string(),
            local_node: local_node.map(str::to_string),
        }
    }
}

impl<R: CommandRunner> Topology for CommandTopology<R> {
    async fn list_members(&self) -> ClusterResult<Vec<Node>> {
        let here = Node::local("localhost", "127.0.0.1");
        let output = self
            .runner
            .run(&here, &self.command, None)
            .await?
            .check(&here)?;
        let nodes = decode_members(&output.stdout, self.local_node.as_deref())?;
        debug!(members = nodes.len(), command = %self.command, "cluster members resolved");
        Ok(nodes)
    }
}

#[derive(Debug, Deserialize)]
struct MemberEntry {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    name: String,
    #[serde(alias = "ip")]
    address: Option<String>,
    #[serde(default)]
    local: LocalFlag,
}

/// Accepts `true`/`false` or `1`/`0`.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum LocalFlag {
    Bool(bool),
    Int(i64),
    #[default]
    Absent,
}

impl LocalFlag {
    fn is_set(&self) -> bool {
        match self {
            LocalFlag::Bool(b) => *b,
            LocalFlag::Int(i) => *i != 0,
            LocalFlag::Absent => false,
        }
    }
}

/// Decode a member document into nodes.
pub fn decode_members(json: &[u8], local_override: Option<&str>) -> ClusterResult<Vec<Node>> {
    let entries: Vec<MemberEntry> =
        serde_json::from_slice(json).map_err(|e| ClusterError::Decode(e.to_string()))?;

    let mut nodes: Vec<Node> = Vec::new();
    for entry in entries {
        if entry.kind.as_deref().is_some_and(|k| k != "node") {
            continue;
        }
        let address = entry.address.ok_or_else(|| {
            ClusterError::Decode(format!("member {:?} has no address", entry.name))
        })?;
        if nodes.iter().any(|n| n.name == entry.name) {
            return Err(ClusterError::Decode(format!(
                "member {:?} listed twice",
                entry.name
            )));
        }
        let is_local = match local_override {
            Some(name) => name == entry.name,
            None => entry.local.is_set(),
        };
        nodes.push(Node {
            name: entry.name,
            address,
            is_local,
        });
    }
    Ok(nodes)
}
