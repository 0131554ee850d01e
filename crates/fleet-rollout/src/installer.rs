//! Node installer — the per-node install state machine.
//!
//! ```text
//! Idle → Transferring → Validating → BackingUp → Installing
//!      → RestartingServices → Verified | NeedsRestart
//! ```
//!
//! Any step before `RestartingServices` can end the run in `Failed`.
//! Validation always happens before anything on the node is overwritten,
//! and an existing artifact is backed up before it is replaced; if that
//! backup cannot be written, the install does not happen. A failed
//! restart leaves the new artifact in place and ends in `NeedsRestart`.
//!
//! The staged file is discarded on every exit path.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use fleet_backup::BackupStore;
use fleet_backup::naming::UNKNOWN_VERSION;
use fleet_core::{Artifact, Backup, InstallOutcome, InstallStep, Node, StepError, VersionPattern};

use crate::agent::NodeAgent;

/// States visited by one installer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    Idle,
    Transferring,
    Validating,
    BackingUp,
    Installing,
    RestartingServices,
    Verified,
    NeedsRestart,
    Failed,
}

impl From<InstallStep> for InstallPhase {
    fn from(step: InstallStep) -> Self {
        match step {
            InstallStep::Transferring => InstallPhase::Transferring,
            InstallStep::Validating => InstallPhase::Validating,
            InstallStep::BackingUp => InstallPhase::BackingUp,
            InstallStep::Installing => InstallPhase::Installing,
            InstallStep::RestartingServices => InstallPhase::RestartingServices,
        }
    }
}

/// What one installer run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Phases in the order they were entered, ending in a terminal phase.
    pub phases: Vec<InstallPhase>,
    pub outcome: InstallOutcome,
    /// Backup of the artifact this run replaced, if there was one.
    pub backup: Option<Backup>,
}

impl InstallReport {
    pub fn terminal(&self) -> InstallPhase {
        self.phases.last().copied().unwrap_or(InstallPhase::Idle)
    }
}

/// Drives one node through the install state machine.
pub struct NodeInstaller<'a, A> {
    agent: &'a A,
    backups: &'a BackupStore,
    pattern: &'a VersionPattern,
}

impl<'a, A: NodeAgent> NodeInstaller<'a, A> {
    pub fn new(agent: &'a A, backups: &'a BackupStore, pattern: &'a VersionPattern) -> Self {
        Self {
            agent,
            backups,
            pattern,
        }
    }

    /// Run the full state machine for `artifact` on `node`.
    pub async fn install(&self, node: &Node, artifact: &Artifact) -> InstallReport {
        let staged = self.agent.staged_path(artifact);
        let mut run = Run {
            phases: vec![InstallPhase::Idle],
            backup: None,
        };

        let outcome = self.steps(node, artifact, &staged, &mut run).await;

        if let Err(e) = self.agent.discard(node, &staged).await {
            warn!(node = %node.name, %staged, error = %e, "failed to discard staged artifact");
        }

        run.phases.push(match &outcome {
            InstallOutcome::Success => InstallPhase::Verified,
            InstallOutcome::SuccessNeedsRestart(_) => InstallPhase::NeedsRestart,
            InstallOutcome::Failed(_) => InstallPhase::Failed,
        });

        match &outcome {
            InstallOutcome::Success => {
                info!(node = %node.name, version = %artifact.version(), "install verified")
            }
            InstallOutcome::SuccessNeedsRestart(e) => {
                warn!(node = %node.name, version = %artifact.version(), reason = %e, "installed; services need a manual restart")
            }
            InstallOutcome::Failed(e) => {
                warn!(node = %node.name, version = %artifact.version(), reason = %e, "install failed")
            }
        }
        debug!(node = %node.name, phases = ?run.phases, "installer finished");

        InstallReport {
            phases: run.phases,
            outcome,
            backup: run.backup,
        }
    }

    async fn steps(
        &self,
        node: &Node,
        artifact: &Artifact,
        staged: &str,
        run: &mut Run,
    ) -> InstallOutcome {
        run.enter(node, InstallStep::Transferring);
        if let Err(e) = self.agent.stage(node, artifact).await {
            return InstallOutcome::Failed(e.at(InstallStep::Transferring));
        }

        run.enter(node, InstallStep::Validating);
        if let Err(e) = self.agent.validate(node, staged).await {
            return InstallOutcome::Failed(e.at(InstallStep::Validating));
        }

        match self.agent.read_installed(node).await {
            Err(e) => {
                run.enter(node, InstallStep::BackingUp);
                return InstallOutcome::Failed(e.at(InstallStep::BackingUp));
            }
            Ok(None) => {
                debug!(node = %node.name, "nothing installed yet; skipping backup");
            }
            Ok(Some(current)) => {
                run.enter(node, InstallStep::BackingUp);
                let label = self
                    .pattern
                    .extract(&current)
                    .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
                // The store fsyncs; keep that off the runtime threads.
                let store = self.backups.clone();
                let (owner, replaced) = (node.name.clone(), label.clone());
                let written =
                    tokio::task::spawn_blocking(move || store.create(&owner, &current, &replaced))
                        .await;
                match written {
                    Ok(Ok(backup)) => {
                        info!(node = %node.name, id = %backup.id, replaced = %label, "backup written");
                        run.backup = Some(backup);
                    }
                    Ok(Err(e)) => return InstallOutcome::Failed(StepError::Backup(e.to_string())),
                    Err(e) => {
                        return InstallOutcome::Failed(StepError::Backup(format!(
                            "backup task failed: {e}"
                        )));
                    }
                }
            }
        }

        run.enter(node, InstallStep::Installing);
        if let Err(e) = self.agent.install(node, staged).await {
            return InstallOutcome::Failed(e.at(InstallStep::Installing));
        }
        match self.agent.read_installed(node).await {
            Ok(Some(bytes)) if fleet_core::sha256_hex(&bytes) == artifact.sha256 => {}
            Ok(Some(_)) => {
                return InstallOutcome::Failed(StepError::Install(
                    "installed file does not match artifact checksum".to_string(),
                ));
            }
            Ok(None) => {
                return InstallOutcome::Failed(StepError::Install(
                    "installed file missing after install".to_string(),
                ));
            }
            Err(e) => return InstallOutcome::Failed(e.at(InstallStep::Installing)),
        }

        run.enter(node, InstallStep::RestartingServices);
        match self.agent.restart_services(node).await {
            Ok(()) => InstallOutcome::Success,
            Err(e) => InstallOutcome::SuccessNeedsRestart(e.at(InstallStep::RestartingServices)),
        }
    }
}

struct Run {
    phases: Vec<InstallPhase>,
    backup: Option<Backup>,
}

impl Run {
    fn enter(&mut self, node: &Node, step: InstallStep) {
        debug!(node = %node.name, phase = %step, "entering phase");
        self.phases.push(step.into());
    }
}
