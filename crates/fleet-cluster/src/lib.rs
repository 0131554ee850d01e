//! fleet-cluster — how the rollout tooling reaches cluster members.
//!
//! # Architecture
//!
//! ```text
//! Topology (static list or members command)
//!   └── [Node { name, address, is_local }]
//!         └── ConnectivityProber
//!               ├── local node → reachable
//!               └── remote nodes → one bounded `true` over ssh each,
//!                   all in flight at once
//!
//! CommandRunner
//!   └── ShellRunner
//!       ├── local node  → sh -c <script>
//!       └── remote node → ssh -o BatchMode=yes -o ConnectTimeout=N <script>
//! ```
//!
//! Every command runs under an overall timeout in its own process group;
//! the whole group is killed when the timeout fires or when the caller
//! drops the future.

pub mod error;
pub mod probe;
pub mod runner;
pub mod topology;

pub use error::{ClusterError, ClusterResult, RunError, RunResult};
pub use probe::{ConnectivityProber, ProbeReport, Unreachable};
pub use runner::{CommandOutput, CommandRunner, ShellRunner, shell_quote};
pub use topology::{CommandTopology, StaticTopology, Topology};
