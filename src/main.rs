use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use offline_sync::cli::args::{CacheArgs, Cli, Commands, QueueArgs};
use offline_sync::cli::commands::{self, Context};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "OFFLINE_SYNC_LOG";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "offline_sync=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = match cli.command {
        Commands::Completions { shell } => commands::completions(shell)?,
        Commands::Queue(QueueArgs { command }) => {
            let ctx = Context::open(cli.config.as_deref(), cli.output)
                .context("failed to open offline store")?;
            commands::queue(&ctx, command).await?
        },
        Commands::Watch { interval } => {
            let ctx = Context::open(cli.config.as_deref(), cli.output)
                .context("failed to open offline store")?;
            commands::watch(&ctx, interval).await?
        },
        Commands::Cache(CacheArgs { command }) => {
            let ctx = Context::open(cli.config.as_deref(), cli.output)
                .context("failed to open offline store")?;
            commands::cache(&ctx, command)?
        },
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
