//! BackupStore — filesystem-backed, per-node artifact backups.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use fleet_core::{Backup, BackupId, BackupPolicy};

use crate::check::{CheckFailure, IntegrityCheck};
use crate::error::{BackupError, BackupResult};
use crate::naming;
use crate::prune::select_for_deletion;

/// Backups of one artifact, across every node, under a single root.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    artifact: String,
}

impl BackupStore {
    /// Open (or create) a store rooted at `root` for the named artifact.
    pub fn open(root: &Path, artifact: &str) -> BackupResult<Self> {
        fs::create_dir_all(root).map_err(|e| BackupError::io(root, e))?;
        debug!(root = %root.display(), %artifact, "backup store opened");
        Ok(Self {
            root: root.to_path_buf(),
            artifact: artifact.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a copy of `bytes`, the artifact currently installed on `node`,
    /// labeled with the version being replaced.
    pub fn create(&self, node: &str, bytes: &[u8], replaced_version: &str) -> BackupResult<Backup> {
        self.create_at(node, bytes, replaced_version, Utc::now())
    }

    /// Like [`create`](Self::create) with an explicit timestamp.
    ///
    /// Timestamps are truncated to milliseconds and bumped past the newest
    /// existing backup, so each create gets a unique, strictly newer time.
    pub fn create_at(
        &self,
        node: &str,
        bytes: &[u8],
        replaced_version: &str,
        at: DateTime<Utc>,
    ) -> BackupResult<Backup> {
        let dir = self.node_dir(node)?;
        fs::create_dir_all(&dir).map_err(|e| BackupError::io(&dir, e))?;

        let mut timestamp = truncate_millis(at);
        if let Some(newest) = self.list()?.first() {
            if newest.timestamp >= timestamp {
                timestamp = newest.timestamp + TimeDelta::milliseconds(1);
            }
        }

        let name = naming::file_name(&self.artifact, replaced_version, timestamp);
        let path = dir.join(&name);
        let tmp = dir.join(format!(".{name}.tmp"));

        if let Err(e) = write_once(&tmp, &path, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        let backup = Backup {
            id: BackupId::new(node, &name),
            node: node.to_string(),
            version_label: naming::sanitize_label(replaced_version),
            timestamp,
            location: path.display().to_string(),
            size_bytes: bytes.len() as u64,
        };
        info!(
            %node,
            version = %backup.version_label,
            size = backup.size_bytes,
            id = %backup.id,
            "backup created"
        );
        Ok(backup)
    }

    /// Every backup in the store, newest first.
    pub fn list(&self) -> BackupResult<Vec<Backup>> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| BackupError::io(&self.root, e))? {
            let entry = entry.map_err(|e| BackupError::io(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(node) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            all.extend(self.scan_node(&node)?);
        }
        sort_newest_first(&mut all);
        Ok(all)
    }

    /// Backups taken from one node, newest first.
    pub fn list_node(&self, node: &str) -> BackupResult<Vec<Backup>> {
        let mut backups = self.scan_node(node)?;
        sort_newest_first(&mut backups);
        Ok(backups)
    }

    pub fn latest_for(&self, node: &str) -> BackupResult<Option<Backup>> {
        Ok(self.list_node(node)?.into_iter().next())
    }

    pub fn get(&self, id: &BackupId) -> BackupResult<Backup> {
        let (node, _) = id
            .parts()
            .ok_or_else(|| BackupError::NotFound(id.to_string()))?;
        self.scan_node(node)?
            .into_iter()
            .find(|b| &b.id == id)
            .ok_or_else(|| BackupError::NotFound(id.to_string()))
    }

    /// Apply the retention policy to each node's backups. Returns the
    /// number of backups deleted.
    pub fn prune(&self, policy: &BackupPolicy) -> BackupResult<usize> {
        self.prune_at(policy, Utc::now())
    }

    pub fn prune_at(&self, policy: &BackupPolicy, now: DateTime<Utc>) -> BackupResult<usize> {
        let mut deleted = 0;
        for node in self.nodes()? {
            let backups = self.list_node(&node)?;
            for i in select_for_deletion(&backups, policy, now) {
                let backup = &backups[i];
                self.remove(backup)?;
                debug!(%node, id = %backup.id, "pruned backup");
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(deleted, ?policy, "backups pruned");
        }
        Ok(deleted)
    }

    /// Read a backup back for restore after re-validating it.
    ///
    /// The caller must back up whatever is currently installed before
    /// writing these bytes over it.
    pub async fn restore<C: IntegrityCheck>(
        &self,
        id: &BackupId,
        check: &C,
    ) -> BackupResult<Vec<u8>> {
        let backup = self.get(id)?;
        let path = Path::new(&backup.location);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BackupError::io(path, e))?;

        if bytes.is_empty() || bytes.len() as u64 != backup.size_bytes {
            return Err(BackupError::Corrupt {
                id: id.to_string(),
                reason: format!("expected {} bytes, read {}", backup.size_bytes, bytes.len()),
            });
        }

        check.check(path, &bytes).await.map_err(|failure| match failure {
            CheckFailure::Rejected(reason) => BackupError::Validation {
                id: id.to_string(),
                reason,
            },
            CheckFailure::TimedOut(detail) => BackupError::CheckTimeout {
                id: id.to_string(),
                detail,
            },
        })?;

        info!(%id, version = %backup.version_label, "backup validated for restore");
        Ok(bytes)
    }

    pub fn delete(&self, id: &BackupId) -> BackupResult<()> {
        let backup = self.get(id)?;
        self.remove(&backup)?;
        info!(%id, "backup deleted");
        Ok(())
    }

    /// Delete every backup, or only one node's. Returns the number deleted.
    pub fn delete_all(&self, node: Option<&str>) -> BackupResult<usize> {
        let backups = match node {
            Some(node) => self.list_node(node)?,
            None => self.list()?,
        };
        for backup in &backups {
            self.remove(backup)?;
        }
        info!(node = node.unwrap_or("*"), deleted = backups.len(), "backups cleared");
        Ok(backups.len())
    }

    // ── Internals ──────────────────────────────────────────────────

    fn node_dir(&self, node: &str) -> BackupResult<PathBuf> {
        if node.is_empty() || node.starts_with('.') || node.contains(['/', '\\']) {
            return Err(BackupError::InvalidNode(node.to_string()));
        }
        Ok(self.root.join(node))
    }

    fn nodes(&self) -> BackupResult<Vec<String>> {
        let mut nodes = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| BackupError::io(&self.root, e))? {
            let entry = entry.map_err(|e| BackupError::io(&self.root, e))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    nodes.push(name.to_string());
                }
            }
        }
        Ok(nodes)
    }

    fn scan_node(&self, node: &str) -> BackupResult<Vec<Backup>> {
        let dir = self.node_dir(node)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| BackupError::io(&dir, e))? {
            let entry = entry.map_err(|e| BackupError::io(&dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some((label, timestamp)) = naming::parse_file_name(&self.artifact, &name) else {
                continue;
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(%node, %name, error = %e, "skipping unreadable backup");
                    continue;
                }
            };
            backups.push(Backup {
                id: BackupId::new(node, &name),
                node: node.to_string(),
                version_label: label,
                timestamp,
                location: entry.path().display().to_string(),
                size_bytes: meta.len(),
            });
        }
        Ok(backups)
    }

    fn remove(&self, backup: &Backup) -> BackupResult<()> {
        let path = Path::new(&backup.location);
        fs::remove_file(path).map_err(|e| BackupError::io(path, e))
    }
}

fn sort_newest_first(backups: &mut [Backup]) {
    backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Write `bytes` to `tmp`, mark it read-only, and move it into place.
fn write_once(tmp: &Path, dest: &Path, bytes: &[u8]) -> BackupResult<()> {
    let mut file = fs::File::create(tmp).map_err(|e| BackupError::io(tmp, e))?;
    file.write_all(bytes).map_err(|e| BackupError::io(tmp, e))?;
    file.sync_all().map_err(|e| BackupError::io(tmp, e))?;

    let mut perms = file.metadata().map_err(|e| BackupError::io(tmp, e))?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(tmp, perms).map_err(|e| BackupError::io(tmp, e))?;

    fs::rename(tmp, dest).map_err(|e| BackupError::io(dest, e))
}
