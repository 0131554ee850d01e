use std::path::PathBuf;

use anyhow::{Context as _, anyhow};
use chrono::Utc;
use tracing::warn;

use fleet_core::{Artifact, Release};
use fleet_release::{GithubReleases, LocalArtifact, ReleaseSource, fetch_artifact};
use fleet_state::{JournalStore, RolloutKind, RolloutRecord};

use crate::context::{Context, interrupt_on_ctrl_c};
use crate::report;

pub struct InstallRequest {
    pub version: Option<String>,
    pub prerelease: bool,
    pub from_file: Option<PathBuf>,
    pub nodes: Vec<String>,
    pub skip_unreachable: bool,
}

pub async fn install(ctx: &Context, request: InstallRequest) -> anyhow::Result<()> {
    let journal = ctx.journal()?;
    let targets = ctx.select_members(&request.nodes).await?;

    let probe = ctx.probe(&targets).await;
    if !probe.all_reachable() {
        for down in &probe.unreachable {
            eprintln!("unreachable: {} ({})", down.node.name, down.reason);
        }
        if !request.skip_unreachable {
            anyhow::bail!(
                "{} node(s) unreachable; rerun with --skip-unreachable to install on the rest",
                probe.unreachable.len()
            );
        }
        warn!(skipped = ?probe.unreachable_names(), "continuing without unreachable nodes");
    }
    if probe.reachable.is_empty() {
        anyhow::bail!("no reachable nodes to install on");
    }

    let artifact = resolve(ctx, &request)
        .await
        .context("failed to resolve the release to install")?;
    println!(
        "Installing {} ({} bytes, sha256 {}) on {} node(s)",
        artifact.version(),
        artifact.size_bytes(),
        artifact.sha256,
        probe.reachable.len()
    );

    let coordinator = ctx.coordinator()?;
    let interrupt = interrupt_on_ctrl_c();
    let started = Utc::now();
    let result = coordinator
        .run(&probe.reachable, &artifact, &interrupt)
        .await?;

    let record = RolloutRecord::new(
        RolloutKind::Install,
        artifact.release.clone(),
        &artifact.sha256,
        started,
        result,
    );
    finish(&journal, record)
}

pub async fn retry(ctx: &Context) -> anyhow::Result<()> {
    let journal = ctx.journal()?;
    let previous = journal
        .latest_rollout()?
        .ok_or_else(|| anyhow!("no rollout has been recorded yet"))?;

    if previous.result.counts().failed == 0 {
        println!("Nothing to retry: rollout {} has no failed nodes.", previous.id);
        return Ok(());
    }

    let artifact = refetch(ctx, &previous.release)
        .await
        .with_context(|| format!("failed to fetch {} again", previous.release.version))?;
    if artifact.sha256 != previous.artifact_sha256 {
        anyhow::bail!(
            "artifact {} changed since rollout {} (sha256 {} != {})",
            artifact.version(),
            previous.id,
            artifact.sha256,
            previous.artifact_sha256
        );
    }

    let coordinator = ctx.coordinator()?;
    let interrupt = interrupt_on_ctrl_c();
    let started = Utc::now();
    let result = coordinator
        .retry(&previous.result, &artifact, &interrupt)
        .await?;

    let record = RolloutRecord::new(
        RolloutKind::Retry,
        previous.release.clone(),
        &artifact.sha256,
        started,
        result,
    )
    .with_parent(&previous.id);
    finish(&journal, record)
}

/// Print the result, journal it, and turn failures into a non-zero exit.
pub fn finish(journal: &JournalStore, record: RolloutRecord) -> anyhow::Result<()> {
    print!("{}", report::render(&record.result));
    journal
        .put_rollout(&record)
        .context("failed to journal the rollout result")?;
    println!("Recorded as {}", record.id);

    if report::is_failure(&record.result) {
        anyhow::bail!("rollout did not complete on every node");
    }
    Ok(())
}

async fn resolve(ctx: &Context, request: &InstallRequest) -> anyhow::Result<Artifact> {
    if let Some(path) = &request.from_file {
        let source = LocalArtifact::new(path, ctx.pattern()?);
        return Ok(fetch(&source, request.version.as_deref()).await?);
    }
    let source = GithubReleases::new(&ctx.config)?
        .with_prerelease(request.prerelease || ctx.config.release.include_prerelease);
    Ok(fetch(&source, request.version.as_deref()).await?)
}

async fn fetch<S: ReleaseSource>(
    source: &S,
    version: Option<&str>,
) -> fleet_release::ReleaseResult<Artifact> {
    let release = match version {
        Some(v) => source.fetch_by_version(v).await?,
        None => source.fetch_latest().await?,
    };
    fetch_artifact(source, release).await
}

/// Download the bytes of a release recorded earlier.
async fn refetch(ctx: &Context, release: &Release) -> anyhow::Result<Artifact> {
    let locator = &release.download_locator;
    let artifact = if locator.starts_with("https://") || locator.starts_with("http://") {
        fetch_artifact(&GithubReleases::new(&ctx.config)?, release.clone()).await?
    } else {
        fetch_artifact(&LocalArtifact::new(locator, ctx.pattern()?), release.clone()).await?
    };
    Ok(artifact)
}
