mod cmd;
mod reconciler;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use swarmcd_core::paths;

#[derive(Parser)]
#[command(
    name = "swarmcd",
    about = "Keep Docker Swarm stacks in sync with their git repositories",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding config.yaml, repos.yaml and stacks.yaml
    #[arg(long, global = true, env = paths::CONFIGS_ENV, default_value = paths::DEFAULT_CONFIGS_DIR)]
    configs_path: PathBuf,

    /// Revision ledger database file
    #[arg(long, global = true, env = paths::DB_ENV, default_value = paths::DEFAULT_DB_PATH)]
    db: String,

    /// Worker count, overriding `concurrency` in config.yaml
    #[arg(long, global = true, env = paths::CONCURRENCY_ENV)]
    concurrency: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile stacks forever and serve their status over HTTP
    Run {
        /// Listen address for the status server (overrides config.yaml)
        #[arg(long)]
        address: Option<String>,
    },

    /// Print the deployment recorded for every stack
    Revisions,

    /// Load the configuration and report problems
    Validate,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let configs = cli.configs_path;
    let result = match cli.command {
        Commands::Run { address } => cmd::run::run(&configs, &cli.db, cli.concurrency, address),
        Commands::Revisions => cmd::revisions::run(&cli.db, cli.json),
        Commands::Validate => cmd::validate::run(&configs, cli.concurrency, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
