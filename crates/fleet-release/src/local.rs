//! Release source backed by an artifact file already on disk.

use std::path::{Path, PathBuf};

use tracing::debug;

use fleet_core::{Release, Version, VersionPattern};

use crate::ReleaseSource;
use crate::error::{ReleaseError, ReleaseResult};

/// Serves a single local file as the only available release.
///
/// The version label is read from the file content via the configured
/// pattern unless one is given explicitly.
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    path: PathBuf,
    pattern: VersionPattern,
}

impl LocalArtifact {
    pub fn new(path: impl Into<PathBuf>, pattern: VersionPattern) -> Self {
        Self {
            path: path.into(),
            pattern,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> ReleaseResult<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| ReleaseError::Io {
                path: self.path.display().to_string(),
                source,
            })
    }

    fn release(&self, version: String) -> Release {
        let is_prerelease = Version::parse(&version).is_ok_and(|v| v.is_prerelease());
        Release {
            version,
            download_locator: self.path.display().to_string(),
            is_prerelease,
        }
    }
}

impl ReleaseSource for LocalArtifact {
    async fn fetch_latest(&self) -> ReleaseResult<Release> {
        let bytes = self.read().await?;
        let version = self.pattern.extract(&bytes).ok_or_else(|| {
            ReleaseError::Decode(format!(
                "no version label found in {}; pass the version explicitly",
                self.path.display()
            ))
        })?;
        debug!(path = %self.path.display(), %version, "local artifact version read");
        Ok(self.release(version))
    }

    async fn fetch_by_version(&self, version: &str) -> ReleaseResult<Release> {
        let bytes = self.read().await?;
        if let Some(embedded) = self.pattern.extract(&bytes) {
            let same = matches!(
                (Version::parse(&embedded), Version::parse(version)),
                (Ok(a), Ok(b)) if a == b
            );
            if !same {
                return Err(ReleaseError::NotFound(format!(
                    "{} carries version {embedded}, not {version}",
                    self.path.display()
                )));
            }
        }
        Ok(self.release(version.to_string()))
    }

    async fn download(&self, locator: &str) -> ReleaseResult<Vec<u8>> {
        let path = Path::new(locator);
        tokio::fs::read(path)
            .await
            .map_err(|source| ReleaseError::Io {
                path: locator.to_string(),
                source,
            })
    }
}
