//! Command execution on cluster nodes.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use fleet_core::Node;
use fleet_core::config::SshConfig;

use crate::error::{RunError, RunResult};

/// ssh exits with 255 when the connection itself fails.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`RunError::Failed`].
    pub fn check(self, node: &Node) -> RunResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(RunError::Failed {
                node: node.name.clone(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs shell scripts on nodes.
pub trait CommandRunner: Send + Sync {
    /// Run `script` on `node`, feeding `stdin` if given.
    ///
    /// Only transport-level problems are errors; a script that exits
    /// non-zero yields `Ok` with the exit code.
    fn run(
        &self,
        node: &Node,
        script: &str,
        stdin: Option<&[u8]>,
    ) -> impl Future<Output = RunResult<CommandOutput>> + Send;
}

/// Runs local-node scripts through `sh -c` and remote ones through `ssh`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    user: String,
    port: u16,
    connect_timeout: Duration,
    command_timeout: Duration,
    extra_options: Vec<String>,
}

impl ShellRunner {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            user: config.user.clone(),
            port: config.port,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            extra_options: config.extra_options.clone(),
        }
    }

    /// Override the overall per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    fn command_for(&self, node: &Node, script: &str) -> Command {
        if node.is_local {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            return cmd;
        }

        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-p")
            .arg(self.port.to_string());
        for opt in &self.extra_options {
            cmd.arg("-o").arg(opt);
        }
        cmd.arg(format!("{}@{}", self.user, node.address))
            .arg("--")
            .arg(script);
        cmd
    }
}

impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        node: &Node,
        script: &str,
        stdin: Option<&[u8]>,
    ) -> RunResult<CommandOutput> {
        let mut cmd = self.command_for(node, script);
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

        debug!(node = %node.name, %script, "running command");

        let spawn_err = |e: std::io::Error| RunError::Spawn {
            node: node.name.clone(),
            detail: e.to_string(),
        };

        let exec = async {
            let mut child = cmd.spawn().map_err(spawn_err)?;
            let group = GroupKill::new(child.id());
            if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(bytes).await.map_err(spawn_err)?;
                pipe.shutdown().await.map_err(spawn_err)?;
            }
            let output = child.wait_with_output().await.map_err(spawn_err)?;
            group.disarm();
            Ok::<_, RunError>(output)
        };

        // Dropping `exec` on timeout drops the group guard, which kills the
        // child and everything it started.
        let output = tokio::time::timeout(self.command_timeout, exec)
            .await
            .map_err(|_| RunError::Timeout {
                node: node.name.clone(),
                after: self.command_timeout,
            })??;

        let code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !node.is_local && code == Some(SSH_CONNECTION_FAILURE) {
            return Err(RunError::Unreachable {
                node: node.name.clone(),
                detail: stderr.trim().to_string(),
            });
        }

        debug!(node = %node.name, ?code, "command finished");
        Ok(CommandOutput {
            code,
            stdout: output.stdout,
            stderr,
        })
    }
}

/// SIGKILLs a child's process group when dropped, unless disarmed.
///
/// Each command runs as the leader of its own group, so this reaches the
/// shell and every descendant it spawned.
struct GroupKill {
    pgid: Option<libc::pid_t>,
}

impl GroupKill {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|p| libc::pid_t::try_from(p).ok()),
        }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        // SAFETY: killpg takes plain integers; the group was created for
        // this child by `process_group(0)`.
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
            debug!(pgid, "killed command process group");
        } else {
            debug!(pgid, error = %std::io::Error::last_os_error(), "process group already gone");
        }
    }
}

/// Single-quote a value for POSIX sh.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
