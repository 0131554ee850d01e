//! Shared types used across fleet crates.
//!
//! Everything here is plain data. Nodes and releases are resolved once per
//! rollout and never mutated afterwards; outcomes and backups are values
//! that callers pass around rather than accumulate in place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ── Nodes ──────────────────────────────────────────────────────────

/// A single cluster member targeted for install/update.
///
/// Identity is `name`; it must be unique within a rollout's target set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub is_local: bool,
}

impl Node {
    pub fn remote(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            is_local: false,
        }
    }

    pub fn local(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            is_local: true,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local {
            write!(f, "{} (local)", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.address)
        }
    }
}

// ── Releases ───────────────────────────────────────────────────────

/// Release metadata as fetched from the registry.
///
/// Immutable once fetched for a given rollout invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Version tag as published (may carry a leading `v`).
    pub version: String,
    /// Direct download URL, or a local path for file-backed releases.
    pub download_locator: String,
    #[serde(default)]
    pub is_prerelease: bool,
}

/// A release together with its downloaded bytes.
///
/// Shared read-only across every node install of one rollout.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub release: Release,
    pub bytes: Vec<u8>,
    /// Hex-encoded SHA-256 of `bytes`.
    pub sha256: String,
}

impl Artifact {
    pub fn new(release: Release, bytes: Vec<u8>) -> Self {
        let sha256 = sha256_hex(&bytes);
        Self {
            release,
            bytes,
            sha256,
        }
    }

    pub fn version(&self) -> &str {
        &self.release.version
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Hex-encoded SHA-256 digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ── Install outcomes ───────────────────────────────────────────────

/// A step of the per-node install state machine that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStep {
    Transferring,
    Validating,
    BackingUp,
    Installing,
    RestartingServices,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallStep::Transferring => "transfer",
            InstallStep::Validating => "validation",
            InstallStep::BackingUp => "backup",
            InstallStep::Installing => "install",
            InstallStep::RestartingServices => "service restart",
        };
        f.write_str(s)
    }
}

/// Why a node install did not fully succeed.
///
/// Carried as data inside [`InstallOutcome`]; serializable so reasons
/// survive in the rollout journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepError {
    #[error("node unreachable: {0}")]
    Connectivity(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("backup failed: {0}")]
    Backup(String),

    #[error("install failed: {0}")]
    Install(String),

    #[error("service restart failed: {0}")]
    ServiceRestart(String),

    #[error("{step} timed out: {detail}")]
    Timeout { step: InstallStep, detail: String },
}

/// Terminal result of one Node Installer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// Installed, verified, and services restarted.
    Success,
    /// Installed and verified, but dependent services must be restarted by hand.
    SuccessNeedsRestart(StepError),
    /// Nothing was applied beyond what the failing step leaves behind.
    Failed(StepError),
}

impl InstallOutcome {
    /// Success and needs-restart both count as a successful install.
    pub fn is_success(&self) -> bool {
        !self.is_failed()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, InstallOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            InstallOutcome::Success => "success",
            InstallOutcome::SuccessNeedsRestart(_) => "needs restart",
            InstallOutcome::Failed(_) => "failed",
        }
    }

    /// The reason string for non-clean outcomes.
    pub fn reason(&self) -> Option<String> {
        match self {
            InstallOutcome::Success => None,
            InstallOutcome::SuccessNeedsRestart(e) | InstallOutcome::Failed(e) => {
                Some(e.to_string())
            }
        }
    }
}

// ── Backups ────────────────────────────────────────────────────────

/// Identifier of a stored backup: `{node}/{file name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupId(pub String);

impl BackupId {
    pub fn new(node: &str, file_name: &str) -> Self {
        Self(format!("{node}/{file_name}"))
    }

    /// Split into `(node, file name)`.
    pub fn parts(&self) -> Option<(&str, &str)> {
        self.0.split_once('/')
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable, timestamped, version-labeled copy of a previously
/// installed artifact. Only ever created or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: BackupId,
    /// Node the artifact was taken from.
    pub node: String,
    /// Version of the artifact that was replaced.
    pub version_label: String,
    pub timestamp: DateTime<Utc>,
    /// Filesystem location of the stored copy.
    pub location: String,
    pub size_bytes: u64,
}

/// Retention thresholds applied by backup pruning.
///
/// `None` disables a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicy {
    pub max_count: Option<usize>,
    pub max_age_days: Option<u32>,
    pub max_total_size_mb: Option<u64>,
}

impl BackupPolicy {
    pub const DEFAULT_MAX_COUNT: usize = 10;
    pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;
    pub const DEFAULT_MAX_TOTAL_SIZE_MB: u64 = 100;

    /// A policy with every threshold disabled.
    pub fn unbounded() -> Self {
        Self {
            max_count: None,
            max_age_days: None,
            max_total_size_mb: None,
        }
    }

    pub fn with_max_count(mut self, count: usize) -> Self {
        self.max_count = Some(count);
        self
    }

    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn with_max_total_size_mb(mut self, mb: u64) -> Self {
        self.max_total_size_mb = Some(mb);
        self
    }
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            max_count: Some(Self::DEFAULT_MAX_COUNT),
            max_age_days: Some(Self::DEFAULT_MAX_AGE_DAYS),
            max_total_size_mb: Some(Self::DEFAULT_MAX_TOTAL_SIZE_MB),
        }
    }
}
