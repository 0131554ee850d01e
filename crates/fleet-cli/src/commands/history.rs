use crate::context::Context;

pub fn history(ctx: &Context, limit: usize) -> anyhow::Result<()> {
    let records = ctx.journal()?.list_rollouts(limit)?;
    if records.is_empty() {
        println!("No rollouts recorded.");
        return Ok(());
    }

    println!(
        "{:<28} {:<9} {:<14} {:<20} RESULT",
        "ID", "KIND", "VERSION", "STARTED"
    );
    for record in records {
        println!(
            "{:<28} {:<9} {:<14} {:<20} {}",
            record.id,
            record.kind.to_string(),
            record.release.version,
            record.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.result.counts()
        );
    }
    Ok(())
}
