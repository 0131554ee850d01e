//! fleet-core — shared vocabulary for the fleet rollout tooling.
//!
//! Holds the data model every other crate speaks (nodes, releases,
//! artifacts, outcomes, backups), the numeric version ordering used to
//! decide whether a node is behind, and the `fleet.toml` parser.

pub mod config;
pub mod error;
pub mod result;
pub mod types;
pub mod version;

pub use config::FleetConfig;
pub use error::{CoreError, CoreResult};
pub use result::{Halt, NodeResult, NodeStatus, RolloutCounts, RolloutResult};
pub use types::*;
pub use version::{Version, VersionPattern, compare};
