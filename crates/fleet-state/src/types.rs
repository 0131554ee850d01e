//! Journal record types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_core::{Release, RolloutResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutKind {
    Install,
    Retry,
    Rollback,
}

impl fmt::Display for RolloutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RolloutKind::Install => "install",
            RolloutKind::Retry => "retry",
            RolloutKind::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// One journaled rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutRecord {
    pub id: String,
    pub kind: RolloutKind,
    /// Release that was rolled out. For rollbacks the locator names the
    /// backup that was restored.
    pub release: Release,
    pub artifact_sha256: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Record this one retried, if any.
    pub parent: Option<String>,
    pub result: RolloutResult,
}

impl RolloutRecord {
    pub fn new(
        kind: RolloutKind,
        release: Release,
        artifact_sha256: &str,
        started_at: DateTime<Utc>,
        result: RolloutResult,
    ) -> Self {
        Self {
            id: record_key(started_at, kind),
            kind,
            release,
            artifact_sha256: artifact_sha256.to_string(),
            started_at,
            finished_at: Utc::now(),
            parent: None,
            result,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn table_key(&self) -> String {
        self.id.clone()
    }
}

/// Chronologically sortable key for a record.
pub fn record_key(started_at: DateTime<Utc>, kind: RolloutKind) -> String {
    let millis = started_at.timestamp_millis().max(0);
    format!("{millis:020}-{kind}")
}
