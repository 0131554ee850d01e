use std::path::Path;

use fleet_core::FleetConfig;

pub fn init(
    path: &Path,
    repository: &str,
    artifact: &str,
    target: &str,
    force: bool,
) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = FleetConfig::scaffold(repository, artifact, target);
    config.validate()?;
    std::fs::write(path, config.to_toml_string()?)?;
    println!("Wrote {}", path.display());
    println!("Edit [cluster] to list your nodes before running `fleet install`.");
    Ok(())
}
