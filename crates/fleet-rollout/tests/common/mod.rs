//! In-memory node agent for coordinator scenarios.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use regex::Regex;

use fleet_backup::BackupStore;
use fleet_core::{Artifact, InstallStep, Node, Release, VersionPattern};
use fleet_rollout::{AgentError, AgentResult, Coordinator, NodeAgent};

pub const PATTERN: &str = r"VERSION = '([^']+)'";

pub fn pattern() -> VersionPattern {
    VersionPattern::new(Some(Regex::new(PATTERN).unwrap()))
}

pub fn artifact(version: &str) -> Artifact {
    Artifact::new(
        Release {
            version: version.to_string(),
            download_locator: format!("https://dl.example/{version}/Plugin.pm"),
            is_prerelease: false,
        },
        plugin_source(version),
    )
}

pub fn plugin_source(version: &str) -> Vec<u8> {
    format!("package Plugin;\nour $VERSION = '{version}';\n1;\n").into_bytes()
}

pub fn cluster() -> Vec<Node> {
    vec![
        Node::local("local", "10.0.0.1"),
        Node::remote("nodeA", "10.0.0.2"),
        Node::remote("nodeB", "10.0.0.3"),
    ]
}

pub fn coordinator(agent: FakeAgent, dir: &tempfile::TempDir) -> Coordinator<FakeAgent> {
    let backups = BackupStore::open(&dir.path().join("backups"), "Plugin.pm").unwrap();
    Coordinator::new(agent, backups, pattern())
}

struct Failure {
    step: InstallStep,
    error: AgentError,
    remaining: u32,
}

#[derive(Default)]
struct State {
    installed: HashMap<String, Vec<u8>>,
    staged: HashMap<(String, String), Vec<u8>>,
    failures: HashMap<String, Failure>,
    hang_on_stage: HashSet<String>,
    hang_on_install: HashSet<String>,
    corrupt_install: HashSet<String>,
    calls: Vec<(String, &'static str)>,
}

/// Node agent that keeps every node's files in memory.
#[derive(Default)]
pub struct FakeAgent {
    state: Mutex<State>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(self, node: &str, bytes: &[u8]) -> Self {
        self.lock().installed.insert(node.to_string(), bytes.to_vec());
        self
    }

    /// Fail every run on `node` at `step`.
    pub fn failing(self, node: &str, step: InstallStep) -> Self {
        self.failing_times(node, step, u32::MAX)
    }

    /// Fail the first `times` runs on `node` at `step`.
    pub fn failing_times(self, node: &str, step: InstallStep, times: u32) -> Self {
        self.lock().failures.insert(
            node.to_string(),
            Failure {
                step,
                error: AgentError::Failed(format!("injected {step} failure")),
                remaining: times,
            },
        );
        self
    }

    /// Staging on `node` never completes.
    pub fn hanging(self, node: &str) -> Self {
        self.lock().hang_on_stage.insert(node.to_string());
        self
    }

    /// Installing on `node` never completes, after staging succeeded.
    pub fn hanging_in_install(self, node: &str) -> Self {
        self.lock().hang_on_install.insert(node.to_string());
        self
    }

    /// Installs on `node` write different bytes than were staged.
    pub fn corrupting(self, node: &str) -> Self {
        self.lock().corrupt_install.insert(node.to_string());
        self
    }

    pub fn installed(&self, node: &str) -> Option<Vec<u8>> {
        self.lock().installed.get(node).cloned()
    }

    pub fn staged_count(&self) -> usize {
        self.lock().staged.len()
    }

    /// Operations performed on `node`, in order.
    pub fn calls(&self, node: &str) -> Vec<&'static str> {
        self.lock()
            .calls
            .iter()
            .filter(|(n, _)| n == node)
            .map(|(_, op)| *op)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record the call and fire an injected failure for `step` if one is due.
    fn enter(&self, node: &Node, op: &'static str, step: Option<InstallStep>) -> AgentResult<()> {
        let mut state = self.lock();
        state.calls.push((node.name.clone(), op));
        let Some(step) = step else {
            return Ok(());
        };
        if let Some(failure) = state.failures.get_mut(&node.name) {
            if failure.step == step && failure.remaining > 0 {
                failure.remaining -= 1;
                return Err(failure.error.clone());
            }
        }
        Ok(())
    }
}

impl NodeAgent for FakeAgent {
    fn staged_path(&self, artifact: &Artifact) -> String {
        format!("/var/tmp/.Plugin.pm.{}.incoming", artifact.version())
    }

    async fn stage(&self, node: &Node, artifact: &Artifact) -> AgentResult<()> {
        self.enter(node, "stage", Some(InstallStep::Transferring))?;
        let hang = self.lock().hang_on_stage.contains(&node.name);
        if hang {
            std::future::pending::<()>().await;
        }
        let path = self.staged_path(artifact);
        self.lock()
            .staged
            .insert((node.name.clone(), path), artifact.bytes.clone());
        Ok(())
    }

    async fn validate(&self, node: &Node, staged: &str) -> AgentResult<()> {
        self.enter(node, "validate", Some(InstallStep::Validating))?;
        let state = self.lock();
        match state.staged.get(&(node.name.clone(), staged.to_string())) {
            Some(bytes) if !bytes.is_empty() => Ok(()),
            _ => Err(AgentError::Failed("staged file missing".to_string())),
        }
    }

    async fn read_installed(&self, node: &Node) -> AgentResult<Option<Vec<u8>>> {
        self.enter(node, "read", None)?;
        Ok(self.installed(&node.name))
    }

    async fn install(&self, node: &Node, staged: &str) -> AgentResult<()> {
        self.enter(node, "install", Some(InstallStep::Installing))?;
        let hang = self.lock().hang_on_install.contains(&node.name);
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = self.lock();
        let mut bytes = state
            .staged
            .get(&(node.name.clone(), staged.to_string()))
            .cloned()
            .ok_or_else(|| AgentError::Failed("staged file missing".to_string()))?;
        if state.corrupt_install.contains(&node.name) {
            bytes.push(b'#');
        }
        state.installed.insert(node.name.clone(), bytes);
        Ok(())
    }

    async fn restart_services(&self, node: &Node) -> AgentResult<()> {
        self.enter(node, "restart", Some(InstallStep::RestartingServices))
    }

    async fn discard(&self, node: &Node, staged: &str) -> AgentResult<()> {
        self.enter(node, "discard", None)?;
        self.lock()
            .staged
            .remove(&(node.name.clone(), staged.to_string()));
        Ok(())
    }
}
