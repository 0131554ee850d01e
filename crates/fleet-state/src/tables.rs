//! redb table definitions for the rollout journal.

use redb::TableDefinition;

/// Rollout records keyed by `{started_at_millis:020}-{kind}`.
pub const ROLLOUTS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollouts");
