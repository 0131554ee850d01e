//! Node agents — the operations the installer performs on a node.
//!
//! The installer never touches a node directly. It asks a [`NodeAgent`] to
//! stage bytes, validate them, read or replace the installed artifact,
//! restart services, and discard staged files. [`ShellAgent`] implements
//! this over a [`CommandRunner`], so local and remote nodes differ only in
//! how the runner executes a script.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, info, warn};

use fleet_cluster::{CommandRunner, RunError, shell_quote};
use fleet_core::config::ArtifactConfig;
use fleet_core::{Artifact, InstallStep, Node, StepError};

/// Exit code the read script uses to say "nothing installed".
const ABSENT_EXIT: i32 = 44;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("{0}")]
    Unreachable(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Failed(String),
}

impl AgentError {
    /// Attribute the error to the install step that hit it.
    pub fn at(self, step: InstallStep) -> StepError {
        match self {
            AgentError::Unreachable(detail) => StepError::Connectivity(detail),
            AgentError::Timeout(detail) => StepError::Timeout { step, detail },
            AgentError::Failed(detail) => match step {
                InstallStep::Transferring => StepError::Transfer(detail),
                InstallStep::Validating => StepError::Validation(detail),
                InstallStep::BackingUp => StepError::Backup(detail),
                InstallStep::Installing => StepError::Install(detail),
                InstallStep::RestartingServices => StepError::ServiceRestart(detail),
            },
        }
    }
}

impl From<RunError> for AgentError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Unreachable { .. } => AgentError::Unreachable(e.to_string()),
            RunError::Timeout { .. } => AgentError::Timeout(e.to_string()),
            RunError::Failed { .. } | RunError::Spawn { .. } => AgentError::Failed(e.to_string()),
        }
    }
}

/// Artifact operations on a single node.
pub trait NodeAgent: Send + Sync {
    /// Where `artifact` is staged on a node. Deterministic, so an
    /// interrupted install can be cleaned up without extra state.
    fn staged_path(&self, artifact: &Artifact) -> String;

    /// Copy the artifact bytes to the staged path.
    fn stage(&self, node: &Node, artifact: &Artifact)
    -> impl Future<Output = AgentResult<()>> + Send;

    /// Check the staged file before anything is overwritten.
    fn validate(&self, node: &Node, staged: &str) -> impl Future<Output = AgentResult<()>> + Send;

    /// Bytes of the currently installed artifact, `None` if absent.
    fn read_installed(
        &self,
        node: &Node,
    ) -> impl Future<Output = AgentResult<Option<Vec<u8>>>> + Send;

    /// Replace the installed artifact with the staged file.
    fn install(&self, node: &Node, staged: &str) -> impl Future<Output = AgentResult<()>> + Send;

    fn restart_services(&self, node: &Node) -> impl Future<Output = AgentResult<()>> + Send;

    /// Remove the staged file. Succeeds when it is already gone.
    fn discard(&self, node: &Node, staged: &str) -> impl Future<Output = AgentResult<()>> + Send;
}

/// Runs artifact operations as shell scripts through a [`CommandRunner`].
pub struct ShellAgent<R> {
    runner: R,
    config: ArtifactConfig,
}

impl<R: CommandRunner> ShellAgent<R> {
    pub fn new(runner: R, config: ArtifactConfig) -> Self {
        Self { runner, config }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Where `install` writes the new copy before moving it over the target.
    fn temp_path(&self) -> String {
        format!("{}.fleet-new", self.config.target_path)
    }

    async fn run(&self, node: &Node, script: &str, stdin: Option<&[u8]>) -> AgentResult<Vec<u8>> {
        let output = self.runner.run(node, script, stdin).await?.check(node)?;
        Ok(output.stdout)
    }
}

impl<R: CommandRunner> NodeAgent for ShellAgent<R> {
    fn staged_path(&self, artifact: &Artifact) -> String {
        format!(
            "{}/.{}.{}.incoming",
            self.config.staging_dir.trim_end_matches('/'),
            self.config.name,
            path_safe(artifact.version())
        )
    }

    async fn stage(&self, node: &Node, artifact: &Artifact) -> AgentResult<()> {
        let path = self.staged_path(artifact);
        let script = format!(
            "mkdir -p {} && cat > {}",
            shell_quote(&self.config.staging_dir),
            shell_quote(&path)
        );
        self.run(node, &script, Some(artifact.bytes.as_slice()))
            .await?;
        debug!(node = %node.name, %path, size = artifact.size_bytes(), "artifact staged");
        Ok(())
    }

    async fn validate(&self, node: &Node, staged: &str) -> AgentResult<()> {
        let quoted = shell_quote(staged);
        let script = match &self.config.validate_command {
            Some(template) => format!("test -s {quoted} && {}", template.replace("{path}", &quoted)),
            None => format!("test -s {quoted}"),
        };
        self.run(node, &script, None).await?;
        debug!(node = %node.name, "staged artifact validated");
        Ok(())
    }

    async fn read_installed(&self, node: &Node) -> AgentResult<Option<Vec<u8>>> {
        let target = shell_quote(&self.config.target_path);
        let script = format!("if [ -f {target} ]; then cat {target}; else exit {ABSENT_EXIT}; fi");
        let output = self.runner.run(node, &script, None).await?;
        if output.code == Some(ABSENT_EXIT) {
            return Ok(None);
        }
        Ok(Some(output.check(node)?.stdout))
    }

    async fn install(&self, node: &Node, staged: &str) -> AgentResult<()> {
        let target = &self.config.target_path;
        let temp = shell_quote(&self.temp_path());
        let script = format!(
            "install -D -m 0644 {} {temp} && mv -f {temp} {} || {{ rm -f {temp}; exit 1; }}",
            shell_quote(staged),
            shell_quote(target)
        );
        self.run(node, &script, None).await?;
        info!(node = %node.name, %target, "artifact installed");
        Ok(())
    }

    async fn restart_services(&self, node: &Node) -> AgentResult<()> {
        let mut failed = Vec::new();
        for service in &self.config.restart_services {
            let script = self
                .config
                .restart_command
                .replace("{service}", &shell_quote(service));
            match self.run(node, &script, None).await {
                Ok(_) => debug!(node = %node.name, %service, "service restarted"),
                Err(AgentError::Unreachable(detail)) => {
                    return Err(AgentError::Unreachable(detail));
                }
                Err(e) => {
                    warn!(node = %node.name, %service, error = %e, "service restart failed");
                    failed.push(format!("{service}: {e}"));
                }
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Failed(failed.join("; ")))
        }
    }

    async fn discard(&self, node: &Node, staged: &str) -> AgentResult<()> {
        // An install cut short can leave its temp copy beside the target.
        let script = format!("rm -f {} {}", shell_quote(staged), shell_quote(&self.temp_path()));
        self.run(node, &script, None).await?;
        Ok(())
    }
}

fn path_safe(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
