//! fleet-backup — backup-before-overwrite storage for installed artifacts.
//!
//! Backups live on the operator's filesystem, one directory per node:
//!
//! ```text
//! {root}/{node}/{artifact}__{version label}__{YYYYMMDDTHHMMSS.mmm}Z.bak
//! ```
//!
//! The file name alone identifies a backup and orders it by recency, so
//! listing never needs an index. Files are written once (temp file +
//! rename), made read-only, and only ever removed by an explicit prune or
//! delete.
//!
//! The store takes no locks. Two concurrent invocations writing the same
//! root can interleave creates and prunes; one operator at a time is
//! assumed.

pub mod check;
pub mod error;
pub mod naming;
pub mod prune;
pub mod store;

pub use check::{CheckFailure, CommandCheck, IntegrityCheck, NonEmpty};
pub use error::{BackupError, BackupResult};
pub use store::BackupStore;
