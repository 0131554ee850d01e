//! fleet-release — where artifacts come from.
//!
//! A [`ReleaseSource`] resolves release metadata (latest or a specific
//! version) and downloads the artifact bytes behind a release's locator.
//! [`fetch_artifact`] pairs the two into an [`Artifact`] that a rollout
//! shares read-only across every node.
//!
//! Rate limiting is reported as its own error so callers can surface it
//! instead of retrying into a wall.

pub mod error;
pub mod github;
pub mod local;

use std::future::Future;

use tracing::info;

use fleet_core::{Artifact, Release};

pub use error::{ReleaseError, ReleaseResult};
pub use github::GithubReleases;
pub use local::LocalArtifact;

/// Resolves and downloads releases.
pub trait ReleaseSource: Send + Sync {
    fn fetch_latest(&self) -> impl Future<Output = ReleaseResult<Release>> + Send;

    fn fetch_by_version(&self, version: &str)
    -> impl Future<Output = ReleaseResult<Release>> + Send;

    fn download(&self, locator: &str) -> impl Future<Output = ReleaseResult<Vec<u8>>> + Send;
}

/// Download the bytes behind `release` and wrap them as an artifact.
pub async fn fetch_artifact<S: ReleaseSource>(
    source: &S,
    release: Release,
) -> ReleaseResult<Artifact> {
    let bytes = source.download(&release.download_locator).await?;
    if bytes.is_empty() {
        return Err(ReleaseError::Fetch(format!(
            "{} downloaded as an empty file",
            release.download_locator
        )));
    }
    let artifact = Artifact::new(release, bytes);
    info!(
        version = %artifact.version(),
        size = artifact.size_bytes(),
        sha256 = %artifact.sha256,
        "artifact fetched"
    );
    Ok(artifact)
}
