use std::cmp::Ordering;

use tracing::warn;

use fleet_core::{Version, VersionPattern};
use fleet_release::{GithubReleases, ReleaseSource};
use fleet_rollout::NodeAgent;

use crate::context::Context;

pub async fn status(ctx: &Context, prerelease: bool) -> anyhow::Result<()> {
    let members = ctx.members().await?;
    let report = ctx.probe(&members).await;
    let pattern = ctx.pattern()?;
    let agent = ctx.agent();

    let latest = if ctx.config.release.repository.is_empty() {
        None
    } else {
        let source = GithubReleases::new(&ctx.config)?
            .with_prerelease(prerelease || ctx.config.release.include_prerelease);
        match source.fetch_latest().await {
            Ok(release) => Some(release.version),
            Err(e) => {
                warn!(error = %e, "could not resolve latest release");
                None
            }
        }
    };

    println!("Latest release: {}", latest.as_deref().unwrap_or("unknown"));
    println!("{:<20} {:<16} STATE", "NODE", "INSTALLED");
    for node in &members {
        if report.reachable.iter().all(|n| n.name != node.name) {
            println!("{:<20} {:<16} unreachable", node.name, "-");
            continue;
        }
        let installed = match agent.read_installed(node).await {
            Ok(bytes) => bytes,
            Err(e) => {
                println!("{:<20} {:<16} error: {e}", node.name, "-");
                continue;
            }
        };
        let (label, state) = describe(installed.as_deref(), &pattern, latest.as_deref());
        println!("{:<20} {:<16} {}", node.name, label, state);
    }
    Ok(())
}

/// Installed version label and how it relates to the latest release.
fn describe(
    installed: Option<&[u8]>,
    pattern: &VersionPattern,
    latest: Option<&str>,
) -> (String, &'static str) {
    let Some(bytes) = installed else {
        return ("-".to_string(), "not installed");
    };
    let Some(label) = pattern.extract(bytes) else {
        return ("unknown".to_string(), "installed");
    };
    let state = match latest.map(|l| (Version::parse(&label), Version::parse(l))) {
        Some((Ok(current), Ok(latest))) => match current.cmp(&latest) {
            Ordering::Less => "update available",
            Ordering::Equal => "up to date",
            Ordering::Greater => "ahead",
        },
        Some(_) => "unparseable version",
        None => "installed",
    };
    (label, state)
}
