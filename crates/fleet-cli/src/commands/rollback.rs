use anyhow::anyhow;
use chrono::Utc;

use fleet_core::{BackupId, Release, sha256_hex};
use fleet_state::{RolloutKind, RolloutRecord};

use crate::commands::install::finish;
use crate::context::{Context, interrupt_on_ctrl_c};

pub async fn rollback(ctx: &Context, node: &str, backup: Option<&str>) -> anyhow::Result<()> {
    let journal = ctx.journal()?;
    let node = ctx
        .select_members(&[node.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("{node} is not a cluster member"))?;

    let probe = ctx.probe(std::slice::from_ref(&node)).await;
    if let Some(down) = probe.unreachable.first() {
        anyhow::bail!("{} is unreachable: {}", down.node.name, down.reason);
    }

    let coordinator = ctx.coordinator()?;
    let backup = match backup {
        Some(id) => coordinator.backups().get(&BackupId(id.to_string()))?,
        None => coordinator
            .backups()
            .latest_for(&node.name)?
            .ok_or_else(|| anyhow!("no backups stored for {}", node.name))?,
    };
    let sha256 = sha256_hex(&std::fs::read(&backup.location)?);
    println!(
        "Rolling {} back to {} (backup {})",
        node.name, backup.version_label, backup.id
    );

    let check = ctx.integrity_check();
    let interrupt = interrupt_on_ctrl_c();
    let started = Utc::now();
    let result = coordinator
        .rollback(&node, &backup.id, &check, &interrupt)
        .await?;

    let release = Release {
        version: backup.version_label.clone(),
        download_locator: backup.location.clone(),
        is_prerelease: false,
    };
    let record = RolloutRecord::new(RolloutKind::Rollback, release, &sha256, started, result);
    finish(&journal, record)
}
