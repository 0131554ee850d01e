//! fleet — roll a versioned artifact out across a cluster.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod context;
mod report;

use context::Context;

#[derive(Parser)]
#[command(
    name = "fleet",
    about = "Install, update, and roll back an artifact across cluster nodes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the fleet configuration file.
    #[arg(short, long, global = true, default_value = "fleet.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cluster members and whether they are reachable.
    Nodes,
    /// Show the installed version on each node against the latest release.
    Status {
        /// Compare against the newest pre-release too.
        #[arg(long)]
        prerelease: bool,
    },
    /// Install or update the artifact on cluster nodes.
    Install {
        /// Release version to install (default: latest).
        #[arg(long)]
        version: Option<String>,
        /// Consider pre-releases when resolving the latest release.
        #[arg(long)]
        prerelease: bool,
        /// Install a local file instead of a published release.
        #[arg(long, value_name = "PATH")]
        from_file: Option<PathBuf>,
        /// Restrict the rollout to these nodes (repeatable).
        #[arg(long = "node", value_name = "NAME")]
        nodes: Vec<String>,
        /// Proceed with reachable nodes when some are unreachable.
        #[arg(long)]
        skip_unreachable: bool,
    },
    /// Retry the failed nodes of the most recent rollout.
    Retry,
    /// Restore a backup onto a node.
    Rollback {
        #[arg(long)]
        node: String,
        /// Backup id (default: the node's newest backup).
        #[arg(long)]
        backup: Option<String>,
    },
    /// Manage stored backups.
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },
    /// Show journaled rollouts, newest first.
    History {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum BackupsAction {
    /// List backups, newest first.
    List {
        #[arg(long)]
        node: Option<String>,
    },
    /// Apply the configured retention policy.
    Prune,
    /// Delete backups.
    Clear {
        /// Only this node's backups.
        #[arg(long)]
        node: Option<String>,
        /// Only the backup with this id.
        #[arg(long, conflicts_with = "node")]
        id: Option<String>,
        /// Required; clearing cannot be undone.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a scaffold configuration file.
    Init {
        /// Release repository, `owner/name`.
        #[arg(long, default_value = "owner/plugin")]
        repository: String,
        /// Artifact file name.
        #[arg(long, default_value = "Plugin.pm")]
        artifact: String,
        /// Installed location of the artifact on every node.
        #[arg(long, default_value = "/usr/share/perl5/Plugin.pm")]
        target: String,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    let load = || Context::load(&cli.config);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Init {
                repository,
                artifact,
                target,
                force,
            } => commands::config::init(&cli.config, &repository, &artifact, &target, force),
        },
        Commands::Nodes => commands::nodes::nodes(&load()?).await,
        Commands::Status { prerelease } => commands::status::status(&load()?, prerelease).await,
        Commands::Install {
            version,
            prerelease,
            from_file,
            nodes,
            skip_unreachable,
        } => {
            let request = commands::install::InstallRequest {
                version,
                prerelease,
                from_file,
                nodes,
                skip_unreachable,
            };
            commands::install::install(&load()?, request).await
        }
        Commands::Retry => commands::install::retry(&load()?).await,
        Commands::Rollback { node, backup } => {
            commands::rollback::rollback(&load()?, &node, backup.as_deref()).await
        }
        Commands::Backups { action } => match action {
            BackupsAction::List { node } => commands::backups::list(&load()?, node.as_deref()),
            BackupsAction::Prune => commands::backups::prune(&load()?),
            BackupsAction::Clear { node, id, yes } => {
                commands::backups::clear(&load()?, node.as_deref(), id.as_deref(), yes)
            }
        },
        Commands::History { limit } => commands::history::history(&load()?, limit),
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
