use fleet_backup::{BackupResult, BackupStore};
use fleet_core::BackupId;

use crate::context::Context;

pub fn list(ctx: &Context, node: Option<&str>) -> anyhow::Result<()> {
    let store = ctx.backups()?;
    let backups = match node {
        Some(node) => store.list_node(node)?,
        None => store.list()?,
    };
    if backups.is_empty() {
        println!("No backups in {}.", store.root().display());
        return Ok(());
    }

    println!("{:<64} {:<14} {:<20} SIZE", "ID", "VERSION", "TAKEN");
    for backup in &backups {
        println!(
            "{:<64} {:<14} {:<20} {}",
            backup.id.to_string(),
            backup.version_label,
            backup.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            backup.size_bytes
        );
    }
    let total: u64 = backups.iter().map(|b| b.size_bytes).sum();
    println!("\n{} backups, {} bytes", backups.len(), total);
    Ok(())
}

pub fn prune(ctx: &Context) -> anyhow::Result<()> {
    let policy = ctx.config.backup.policy();
    let deleted = ctx.backups()?.prune(&policy)?;
    println!("Pruned {deleted} backups.");
    Ok(())
}

pub fn clear(ctx: &Context, node: Option<&str>, id: Option<&str>, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("refusing to delete backups without --yes");
    }
    let deleted = remove(&ctx.backups()?, node, id)?;
    println!("Deleted {deleted} backups.");
    Ok(())
}

/// One backup by id, else every backup of `node` (or of all nodes).
fn remove(store: &BackupStore, node: Option<&str>, id: Option<&str>) -> BackupResult<usize> {
    match id {
        Some(id) => store.delete(&BackupId(id.to_string())).map(|()| 1),
        None => store.delete_all(node),
    }
}
