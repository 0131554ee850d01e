//! fleet-state — the rollout journal.
//!
//! Backed by [redb](https://docs.rs/redb). Every finished rollout, retry
//! pass, and rollback is stored as a JSON-serialized [`RolloutRecord`] so a
//! later invocation can retry the failures of an earlier one.
//!
//! Keys are zero-padded millisecond timestamps followed by the record
//! kind, so key order is chronological and the newest record is the last
//! key in the table.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::JournalStore;
pub use types::{RolloutKind, RolloutRecord};
