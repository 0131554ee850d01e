//! Plain-text rendering of rollout results.

use fleet_core::{Halt, NodeStatus, RolloutResult};

pub fn status_label(status: &NodeStatus) -> &'static str {
    match status {
        NodeStatus::Finished(outcome) => outcome.label(),
        NodeStatus::Interrupted => "interrupted",
        NodeStatus::NotAttempted => "not attempted",
    }
}

pub fn render(result: &RolloutResult) -> String {
    let mut out = format!("Rollout of {}\n", result.version);
    for entry in &result.nodes {
        let detail = entry
            .status
            .outcome()
            .and_then(|o| o.reason())
            .unwrap_or_default();
        out.push_str(&format!(
            "  {:<20} {:<14} attempts={:<3} {}\n",
            entry.node.name,
            status_label(&entry.status),
            entry.attempts,
            detail
        ));
    }

    out.push_str(&format!("\n{}\n", result.counts()));
    match result.halt {
        Some(Halt::LocalNodeFailed) => {
            out.push_str("Stopped: the local node failed, remote nodes were not touched.\n")
        }
        Some(Halt::Interrupted) => out.push_str("Stopped: interrupted by operator.\n"),
        None => {}
    }

    let failures = result.failure_report();
    if !failures.is_empty() {
        out.push_str("\nFailed nodes:\n");
        for line in failures {
            out.push_str(&format!("  {line}\n"));
        }
        out.push_str("Run `fleet retry` to retry them.\n");
    }

    let restarts: Vec<&str> = result
        .nodes
        .iter()
        .filter(|r| matches!(r.status.outcome(), Some(o) if o.is_success() && o.reason().is_some()))
        .map(|r| r.node.name.as_str())
        .collect();
    if !restarts.is_empty() {
        out.push_str(&format!(
            "\nRestart services manually on: {}\n",
            restarts.join(", ")
        ));
    }
    out
}

/// Whether the command should exit non-zero for this result.
pub fn is_failure(result: &RolloutResult) -> bool {
    result.counts().failed > 0 || result.halt.is_some()
}
