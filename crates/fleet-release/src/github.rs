//! Release registry client for GitHub-style release APIs.
//!
//! Endpoints used, relative to `{api_base}/repos/{owner}/{name}`:
//!
//! - `GET /releases/latest` for the newest stable release
//! - `GET /releases` when pre-releases are allowed
//! - `GET /releases/tags/{tag}` for a specific version
//!
//! Asset downloads go straight to the asset's `browser_download_url`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use fleet_core::{FleetConfig, Release, Version};

use crate::ReleaseSource;
use crate::error::{ReleaseError, ReleaseResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RELEASE_PAGE_SIZE: u32 = 30;

#[derive(Debug, Clone, Deserialize)]
struct ApiRelease {
    tag_name: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assets: Vec<ApiAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiAsset {
    name: String,
    browser_download_url: String,
}

/// Release source backed by a GitHub-compatible REST API.
#[derive(Debug, Clone)]
pub struct GithubReleases {
    client: reqwest::Client,
    api_base: String,
    repository: String,
    asset_name: String,
    download_base: String,
    include_prerelease: bool,
    token: Option<String>,
}

impl GithubReleases {
    pub fn new(config: &FleetConfig) -> ReleaseResult<Self> {
        let release = &config.release;
        if release.repository.is_empty() {
            return Err(ReleaseError::Fetch(
                "release.repository is not configured".to_string(),
            ));
        }

        let client = reqwest::ClientBuilder::new()
            .user_agent(concat!("fleet/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(release.timeout_secs))
            .build()?;

        let token = release
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());

        let download_base = release.download_base.clone().unwrap_or_else(|| {
            format!("https://github.com/{}/releases/download", release.repository)
        });

        Ok(Self {
            client,
            api_base: release.api_base.trim_end_matches('/').to_string(),
            repository: release.repository.clone(),
            asset_name: config.asset_name().to_string(),
            download_base,
            include_prerelease: release.include_prerelease,
            token,
        })
    }

    /// Consider pre-releases when resolving the latest release.
    pub fn with_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }

    /// GET a JSON document under the repository path. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ReleaseResult<Option<T>> {
        let url = format!("{}/repos/{}{}", self.api_base, self.repository, path);
        debug!(%url, "querying release registry");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        check_rate_limit(status, response.headers())?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.error_for_status()?.bytes().await?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| ReleaseError::Decode(format!("{url}: {e}")))
    }

    async fn newest_including_prereleases(&self) -> ReleaseResult<ApiRelease> {
        let path = format!("/releases?per_page={RELEASE_PAGE_SIZE}");
        let releases: Vec<ApiRelease> = self.get_json(&path).await?.unwrap_or_default();
        newest(releases).ok_or_else(|| {
            ReleaseError::NotFound(format!("no published releases in {}", self.repository))
        })
    }

    fn to_release(&self, api: ApiRelease) -> Release {
        to_release(api, &self.asset_name, &self.download_base)
    }
}

impl ReleaseSource for GithubReleases {
    async fn fetch_latest(&self) -> ReleaseResult<Release> {
        let api = if self.include_prerelease {
            self.newest_including_prereleases().await?
        } else {
            self.get_json::<ApiRelease>("/releases/latest")
                .await?
                .ok_or_else(|| {
                    ReleaseError::NotFound(format!("no latest release in {}", self.repository))
                })?
        };
        let release = self.to_release(api);
        info!(version = %release.version, prerelease = release.is_prerelease, "resolved latest release");
        Ok(release)
    }

    async fn fetch_by_version(&self, version: &str) -> ReleaseResult<Release> {
        for tag in candidate_tags(version) {
            if let Some(api) = self
                .get_json::<ApiRelease>(&format!("/releases/tags/{tag}"))
                .await?
            {
                let release = self.to_release(api);
                info!(version = %release.version, "resolved release by tag");
                return Ok(release);
            }
            debug!(%tag, "no release under tag");
        }
        Err(ReleaseError::NotFound(format!(
            "version {version} in {}",
            self.repository
        )))
    }

    async fn download(&self, locator: &str) -> ReleaseResult<Vec<u8>> {
        if !(locator.starts_with("https://") || locator.starts_with("http://")) {
            return Err(ReleaseError::Fetch(format!(
                "unsupported download locator {locator:?}"
            )));
        }

        debug!(url = %locator, "downloading artifact");
        let mut request = self
            .client
            .get(locator)
            .header(ACCEPT, "application/octet-stream");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        check_rate_limit(status, response.headers())?;
        if status == StatusCode::NOT_FOUND {
            return Err(ReleaseError::NotFound(locator.to_string()));
        }
        let bytes = response.error_for_status()?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

fn check_rate_limit(status: StatusCode, headers: &HeaderMap) -> ReleaseResult<()> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    match rate_limit_from(
        status.as_u16(),
        header("x-ratelimit-remaining"),
        header("x-ratelimit-reset"),
    ) {
        Some(err) => {
            warn!(%status, "release registry rate limit hit");
            Err(err)
        }
        None => Ok(()),
    }
}

/// Classify a response as rate limited: HTTP 429, or 403 with an
/// exhausted quota header.
fn rate_limit_from(status: u16, remaining: Option<&str>, reset: Option<&str>) -> Option<ReleaseError> {
    let limited = status == 429 || (status == 403 && remaining.map(str::trim) == Some("0"));
    if !limited {
        return None;
    }
    let reset = reset
        .and_then(|r| r.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    Some(ReleaseError::RateLimited { reset })
}

/// Tags to try for a requested version, as given first.
fn candidate_tags(version: &str) -> Vec<String> {
    let version = version.trim();
    match version.strip_prefix('v') {
        Some(bare) => vec![version.to_string(), bare.to_string()],
        None => vec![version.to_string(), format!("v{version}")],
    }
}

/// Newest non-draft release by version order. Tags that do not parse as
/// versions are skipped.
fn newest(releases: Vec<ApiRelease>) -> Option<ApiRelease> {
    releases
        .into_iter()
        .filter(|r| !r.draft)
        .filter_map(|r| match Version::parse(&r.tag_name) {
            Ok(v) => Some((v, r)),
            Err(e) => {
                debug!(tag = %r.tag_name, error = %e, "skipping unparseable release tag");
                None
            }
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, r)| r)
}

fn to_release(api: ApiRelease, asset_name: &str, download_base: &str) -> Release {
    let download_locator = api
        .assets
        .iter()
        .find(|a| a.name == asset_name)
        .map(|a| a.browser_download_url.clone())
        .unwrap_or_else(|| {
            format!(
                "{}/{}/{}",
                download_base.trim_end_matches('/'),
                api.tag_name,
                asset_name
            )
        });
    Release {
        version: api.tag_name,
        download_locator,
        is_prerelease: api.prerelease,
    }
}
