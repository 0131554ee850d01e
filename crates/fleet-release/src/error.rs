//! Release source error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type ReleaseResult<T> = Result<T, ReleaseError>;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The registry refused the request for quota reasons. Not retried.
    #[error("rate limited by release registry{}", reset_hint(.reset))]
    RateLimited { reset: Option<DateTime<Utc>> },

    #[error("release not found: {0}")]
    NotFound(String),

    #[error("malformed release metadata: {0}")]
    Decode(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn reset_hint(reset: &Option<DateTime<Utc>>) -> String {
    match reset {
        Some(at) => format!(" until {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => String::new(),
    }
}

impl From<reqwest::Error> for ReleaseError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ReleaseError::Decode(e.to_string())
        } else {
            ReleaseError::Fetch(e.to_string())
        }
    }
}
