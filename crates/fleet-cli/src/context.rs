//! Wiring from `fleet.toml` to the library components.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::{debug, info};

use fleet_backup::{BackupStore, CheckFailure, CommandCheck, IntegrityCheck, NonEmpty};
use fleet_cluster::{CommandTopology, ConnectivityProber, ProbeReport, ShellRunner, StaticTopology, Topology};
use fleet_core::{FleetConfig, Node, VersionPattern};
use fleet_rollout::{Coordinator, Interrupt, ShellAgent};
use fleet_state::JournalStore;

pub struct Context {
    pub config: FleetConfig,
    pub path: PathBuf,
}

impl Context {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = FleetConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        debug!(path = %path.display(), artifact = %config.artifact.name, "configuration loaded");
        Ok(Self {
            config,
            path: path.to_path_buf(),
        })
    }

    pub fn runner(&self) -> ShellRunner {
        ShellRunner::new(&self.config.ssh)
    }

    pub fn pattern(&self) -> anyhow::Result<VersionPattern> {
        Ok(VersionPattern::new(self.config.artifact.version_regex()?))
    }

    /// Cluster members from the members command if configured, otherwise
    /// from the static node list.
    pub async fn members(&self) -> anyhow::Result<Vec<Node>> {
        let cluster = &self.config.cluster;
        let members = match &cluster.members_command {
            Some(command) => {
                CommandTopology::new(self.runner(), command, cluster.local_node.as_deref())
                    .list_members()
                    .await
                    .context("failed to list cluster members")?
            }
            None => StaticTopology::new(cluster.static_nodes()).list_members().await?,
        };
        if members.is_empty() {
            anyhow::bail!("no cluster members configured in {}", self.path.display());
        }
        Ok(members)
    }

    /// Members narrowed to `names`, in member order. Empty `names` selects all.
    pub async fn select_members(&self, names: &[String]) -> anyhow::Result<Vec<Node>> {
        let members = self.members().await?;
        if names.is_empty() {
            return Ok(members);
        }
        if let Some(unknown) = names.iter().find(|n| !members.iter().any(|m| &m.name == *n)) {
            anyhow::bail!("{unknown} is not a cluster member");
        }
        Ok(members
            .into_iter()
            .filter(|m| names.contains(&m.name))
            .collect())
    }

    pub async fn probe(&self, nodes: &[Node]) -> ProbeReport {
        ConnectivityProber::new(self.runner()).probe(nodes).await
    }

    pub fn backups(&self) -> anyhow::Result<BackupStore> {
        let dir = &self.config.backup.dir;
        BackupStore::open(dir, &self.config.artifact.name)
            .with_context(|| format!("failed to open backup store at {}", dir.display()))
    }

    pub fn journal(&self) -> anyhow::Result<JournalStore> {
        let path = &self.config.state.path;
        JournalStore::open(path)
            .with_context(|| format!("failed to open rollout journal at {}", path.display()))
    }

    pub fn agent(&self) -> ShellAgent<ShellRunner> {
        ShellAgent::new(self.runner(), self.config.artifact.clone())
    }

    pub fn coordinator(&self) -> anyhow::Result<Coordinator<ShellAgent<ShellRunner>>> {
        Ok(Coordinator::new(self.agent(), self.backups()?, self.pattern()?))
    }

    /// Check used to re-validate a backup before it is restored.
    pub fn integrity_check(&self) -> RestoreCheck {
        match &self.config.artifact.validate_command {
            Some(template) => RestoreCheck::Command(CommandCheck::new(template, self.runner())),
            None => RestoreCheck::NonEmpty(NonEmpty),
        }
    }
}

/// The backup check selected by `artifact.validate_command`.
#[derive(Debug, Clone)]
pub enum RestoreCheck {
    NonEmpty(NonEmpty),
    Command(CommandCheck<ShellRunner>),
}

impl IntegrityCheck for RestoreCheck {
    async fn check(&self, path: &Path, bytes: &[u8]) -> Result<(), CheckFailure> {
        match self {
            RestoreCheck::NonEmpty(check) => check.check(path, bytes).await,
            RestoreCheck::Command(check) => check.check(path, bytes).await,
        }
    }
}

/// An interrupt that fires on Ctrl-C.
pub fn interrupt_on_ctrl_c() -> Interrupt {
    let (handle, interrupt) = Interrupt::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; stopping after cleanup");
            handle.trigger();
        }
    });
    interrupt
}
