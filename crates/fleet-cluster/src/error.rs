//! Cluster error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from running a single command on a node.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("could not reach {node}: {detail}")]
    Unreachable { node: String, detail: String },

    #[error("command on {node} timed out after {after:?}")]
    Timeout { node: String, after: Duration },

    #[error("command on {node} exited with {code:?}: {stderr}")]
    Failed {
        node: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn command for {node}: {detail}")]
    Spawn { node: String, detail: String },
}

pub type RunResult<T> = Result<T, RunError>;

/// Errors from member discovery.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("members command failed: {0}")]
    Command(#[from] RunError),

    #[error("could not decode member list: {0}")]
    Decode(String),

    #[error("no member is marked local")]
    NoLocalMember,

    #[error("more than one member is marked local: {0:?}")]
    MultipleLocalMembers(Vec<String>),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
