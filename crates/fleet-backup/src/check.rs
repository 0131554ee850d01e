//! Integrity checks run on a backup before it is handed back for restore.

use std::future::Future;
use std::path::Path;

use tracing::debug;

use fleet_cluster::{CommandRunner, RunError, ShellRunner, shell_quote};
use fleet_core::Node;

/// Why a check did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    /// The artifact was examined and found invalid.
    Rejected(String),
    /// The check did not finish in time.
    TimedOut(String),
}

/// Syntactic validation of stored artifact bytes.
pub trait IntegrityCheck: Send + Sync {
    /// `path` is where the bytes live on disk; `bytes` is their content.
    fn check(
        &self,
        path: &Path,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), CheckFailure>> + Send;
}

/// Accepts any non-empty artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmpty;

impl NonEmpty {
    fn verify(bytes: &[u8]) -> Result<(), CheckFailure> {
        if bytes.is_empty() {
            Err(CheckFailure::Rejected("artifact is empty".to_string()))
        } else {
            Ok(())
        }
    }
}

impl IntegrityCheck for NonEmpty {
    async fn check(&self, _path: &Path, bytes: &[u8]) -> Result<(), CheckFailure> {
        Self::verify(bytes)
    }
}

/// Runs a shell command template against the file, `{path}` substituted.
/// A zero exit status passes.
///
/// The command runs on the operator's host through `runner`, under the
/// runner's command timeout.
#[derive(Debug, Clone)]
pub struct CommandCheck<R = ShellRunner> {
    template: String,
    runner: R,
}

impl<R: CommandRunner> CommandCheck<R> {
    pub fn new(template: &str, runner: R) -> Self {
        Self {
            template: template.to_string(),
            runner,
        }
    }
}

impl<R: CommandRunner> IntegrityCheck for CommandCheck<R> {
    async fn check(&self, path: &Path, bytes: &[u8]) -> Result<(), CheckFailure> {
        NonEmpty::verify(bytes)?;

        let script = self
            .template
            .replace("{path}", &shell_quote(&path.display().to_string()));
        debug!(%script, "running backup integrity check");

        let here = Node::local("localhost", "127.0.0.1");
        match self.runner.run(&here, &script, None).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(CheckFailure::Rejected(format!(
                "{} (exit {:?})",
                output.stderr.trim(),
                output.code
            ))),
            Err(e @ RunError::Timeout { .. }) => Err(CheckFailure::TimedOut(e.to_string())),
            Err(e) => Err(CheckFailure::Rejected(e.to_string())),
        }
    }
}
