//! fleet.toml configuration parser.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{BackupPolicy, Node};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub artifact: ArtifactConfig,
    pub release: ReleaseConfig,
    pub ssh: SshConfig,
    pub backup: BackupConfig,
    pub cluster: ClusterConfig,
    pub state: StateConfig,
}

/// What gets installed, and how a node checks and activates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// File name of the artifact (also the release asset name by default).
    pub name: String,
    /// Installed location on every node.
    pub target_path: String,
    /// Directory on each node for transient transfer files.
    pub staging_dir: String,
    /// Syntax check run against a staged file; `{path}` is substituted.
    pub validate_command: Option<String>,
    /// Regex with one capture group that extracts the version label
    /// from installed artifact bytes.
    pub version_pattern: Option<String>,
    /// Services restarted after a successful install.
    pub restart_services: Vec<String>,
    /// Restart command template; `{service}` is substituted.
    pub restart_command: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            name: "artifact".to_string(),
            target_path: "/usr/local/lib/fleet/artifact".to_string(),
            staging_dir: "/tmp".to_string(),
            validate_command: None,
            version_pattern: None,
            restart_services: Vec::new(),
            restart_command: "systemctl restart {service}".to_string(),
        }
    }
}

impl ArtifactConfig {
    /// Compile `version_pattern`, if set.
    pub fn version_regex(&self) -> CoreResult<Option<Regex>> {
        self.version_pattern
            .as_deref()
            .map(|p| {
                let re = Regex::new(p)
                    .map_err(|e| CoreError::Config(format!("artifact.version_pattern: {e}")))?;
                if re.captures_len() < 2 {
                    return Err(CoreError::Config(
                        "artifact.version_pattern needs one capture group".to_string(),
                    ));
                }
                Ok(re)
            })
            .transpose()
    }
}

/// Where releases come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub api_base: String,
    /// `owner/name` on the registry.
    pub repository: String,
    /// Asset to download from a release; defaults to `artifact.name`.
    pub asset_name: Option<String>,
    /// Base used to build a download URL when a release lists no matching
    /// asset: `{download_base}/{tag}/{asset}`.
    pub download_base: Option<String>,
    pub include_prerelease: bool,
    /// Environment variable holding an API token.
    pub token_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            repository: String::new(),
            asset_name: None,
            download_base: None,
            include_prerelease: false,
            token_env: Some("GITHUB_TOKEN".to_string()),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub extra_options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            connect_timeout_secs: 5,
            command_timeout_secs: 120,
            extra_options: Vec::new(),
        }
    }
}

/// Backup location and retention. A threshold of `0` disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub max_count: usize,
    pub max_age_days: u32,
    pub max_total_size_mb: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/fleet/backups"),
            max_count: BackupPolicy::DEFAULT_MAX_COUNT,
            max_age_days: BackupPolicy::DEFAULT_MAX_AGE_DAYS,
            max_total_size_mb: BackupPolicy::DEFAULT_MAX_TOTAL_SIZE_MB,
        }
    }
}

impl BackupConfig {
    pub fn policy(&self) -> BackupPolicy {
        BackupPolicy {
            max_count: (self.max_count > 0).then_some(self.max_count),
            max_age_days: (self.max_age_days > 0).then_some(self.max_age_days),
            max_total_size_mb: (self.max_total_size_mb > 0).then_some(self.max_total_size_mb),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Name of the member this tool runs on.
    pub local_node: Option<String>,
    /// Command printing the member list as JSON.
    pub members_command: Option<String>,
    /// Static member list, used when no command is configured.
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    pub address: String,
}

impl ClusterConfig {
    /// The static member list with the local marker applied.
    pub fn static_nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .map(|n| Node {
                name: n.name.clone(),
                address: n.address.clone(),
                is_local: self.local_node.as_deref() == Some(n.name.as_str()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/fleet/journal.redb"),
        }
    }
}

/// Version pattern written by `init`; matches a Perl `$VERSION = '1.2.3'`.
const SCAFFOLD_VERSION_PATTERN: &str = r"VERSION\s*=\s*'([^']+)'";

impl FleetConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: FleetConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> CoreResult<()> {
        if self.artifact.name.is_empty() || self.artifact.name.contains('/') {
            return Err(CoreError::Config(format!(
                "artifact.name must be a plain file name, got {:?}",
                self.artifact.name
            )));
        }
        if !self.artifact.target_path.starts_with('/') {
            return Err(CoreError::Config(
                "artifact.target_path must be absolute".to_string(),
            ));
        }
        if self.ssh.connect_timeout_secs == 0 || self.ssh.command_timeout_secs == 0 {
            return Err(CoreError::Config("ssh timeouts must be non-zero".to_string()));
        }
        self.artifact.version_regex()?;

        let mut seen = std::collections::HashSet::new();
        for node in &self.cluster.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(CoreError::Config(format!(
                    "duplicate cluster node {:?}",
                    node.name
                )));
            }
        }
        Ok(())
    }

    /// Asset name to look for in a release.
    pub fn asset_name(&self) -> &str {
        self.release
            .asset_name
            .as_deref()
            .unwrap_or(&self.artifact.name)
    }

    /// Scaffold a minimal fleet.toml.
    pub fn scaffold(repository: &str, artifact_name: &str, target_path: &str) -> Self {
        FleetConfig {
            artifact: ArtifactConfig {
                name: artifact_name.to_string(),
                target_path: target_path.to_string(),
                version_pattern: Some(SCAFFOLD_VERSION_PATTERN.to_string()),
                ..Default::default()
            },
            release: ReleaseConfig {
                repository: repository.to_string(),
                download_base: Some(format!("https://github.com/{repository}/releases/download")),
                ..Default::default()
            },
            cluster: ClusterConfig {
                local_node: Some("node1".to_string()),
                members_command: None,
                nodes: vec![NodeEntry {
                    name: "node1".to_string(),
                    address: "127.0.0.1".to_string(),
                }],
            },
            ..Default::default()
        }
    }
}
