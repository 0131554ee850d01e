//! Backup store error types.

use thiserror::Error;

/// Result type alias for backup store operations.
pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid node name for backup storage: {0:?}")]
    InvalidNode(String),

    #[error("backup not found: {0}")]
    NotFound(String),

    #[error("backup {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("backup {id} failed validation: {reason}")]
    Validation { id: String, reason: String },

    #[error("integrity check of backup {id} did not finish: {detail}")]
    CheckTimeout { id: String, detail: String },
}

impl BackupError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
