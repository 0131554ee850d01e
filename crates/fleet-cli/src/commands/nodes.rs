use crate::context::Context;

pub async fn nodes(ctx: &Context) -> anyhow::Result<()> {
    let members = ctx.members().await?;
    let report = ctx.probe(&members).await;

    println!("{:<20} {:<24} {:<6} REACHABLE", "NAME", "ADDRESS", "LOCAL");
    for node in &members {
        let reach = match report.unreachable.iter().find(|u| u.node.name == node.name) {
            Some(u) => format!("no ({})", u.reason),
            None => "yes".to_string(),
        };
        println!(
            "{:<20} {:<24} {:<6} {}",
            node.name,
            node.address,
            if node.is_local { "yes" } else { "" },
            reach
        );
    }
    Ok(())
}
