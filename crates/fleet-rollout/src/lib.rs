//! fleet-rollout — installing one artifact across a set of nodes.
//!
//! # Components
//!
//! - **`agent`** — what the installer can do to a node (stage, validate,
//!   read, install, restart, discard), with a shell/ssh implementation
//! - **`installer`** — the per-node install state machine
//! - **`coordinator`** — sequential rollout, retry pass, and rollback
//! - **`retry`** — the sequential and partition-and-retry combinators
//! - **`interrupt`** / **`progress`** — cancellation and the "still
//!   working" ticker

pub mod agent;
pub mod coordinator;
pub mod installer;
pub mod interrupt;
pub mod progress;
pub mod retry;

pub use agent::{AgentError, AgentResult, NodeAgent, ShellAgent};
pub use coordinator::{Coordinator, RolloutError};
pub use installer::{InstallPhase, InstallReport, NodeInstaller};
pub use interrupt::{Interrupt, InterruptHandle};
pub use progress::ProgressTicker;
pub use retry::{Retried, Sequential, partition_and_retry, run_sequential};
