use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "offline-sync")]
#[command(about = "Durable offline action queue and read cache")]
#[command(long_about = "offline-sync - offline resilience for client applications

Queues mutating actions while the network is unavailable and dispatches
them in priority order once it returns. Read results can be cached with a
TTL so views keep rendering while offline.

QUICK START:
  offline-sync queue add --type create-order --payload '{\"sku\":\"A1\"}'
  offline-sync queue status
  offline-sync queue run
  offline-sync cache set products '[1,2,3]' --ttl 10

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

Executors are configured per action type in ~/.offline-sync/config.yaml.")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output,
    /// or 'json' for machine-readable output suitable for scripting.
    /// Defaults to the configured format.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "OFFLINE_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the pending action queue
    ///
    /// Actions queued here are dispatched to the executor configured for
    /// their type when the queue is run.
    #[command(alias = "q")]
    Queue(QueueArgs),

    /// Manage the offline read cache
    #[command(alias = "c")]
    Cache(CacheArgs),

    /// Keep draining the queue and sweeping the cache until interrupted
    ///
    /// Runs a periodic sync every --interval seconds and a cache sweep at
    /// the configured sweep interval. Stop with Ctrl-C.
    Watch {
        /// Seconds between drains
        #[arg(long, default_value = "60")]
        interval: u64,
    },

    /// Generate shell completions
    ///
    /// # Examples
    ///
    ///   offline-sync completions zsh > ~/.zfunc/_offline-sync
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

/// Queue subcommands.
#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show queue status
    ///
    /// Displays pending and failed counts and the storage backend.
    Status,

    /// List queued actions in dispatch order
    List {
        /// Filter by status (pending, syncing, failed)
        #[arg(long, short = 's')]
        status: Option<String>,

        /// Maximum actions to show
        #[arg(long, short = 'n', default_value = "50")]
        limit: usize,
    },

    /// Queue an action for later dispatch
    Add {
        /// Action type; selects the executor
        #[arg(long = "type", short = 't')]
        action_type: String,

        /// JSON payload handed to the executor
        #[arg(long, short = 'p', default_value = "{}")]
        payload: String,

        /// Dispatch priority (high, medium, low)
        #[arg(long, default_value = "medium")]
        priority: String,
    },

    /// Dispatch pending actions now
    Run,

    /// Reset failed actions to pending
    Retry {
        /// Reset every failed action
        #[arg(long)]
        all: bool,

        /// Action ID to reset
        id: Option<String>,
    },

    /// Remove every queued action
    Clear {
        /// Confirm removal
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show a cached entry
    Get {
        /// Cache key
        key: String,
    },

    /// Cache a JSON value
    Set {
        /// Cache key
        key: String,

        /// JSON value
        value: String,

        /// Minutes until the entry expires (defaults to the configured TTL)
        #[arg(long, conflicts_with = "sticky")]
        ttl: Option<u32>,

        /// Keep the entry until it is removed
        #[arg(long)]
        sticky: bool,
    },

    /// Remove a cached entry
    #[command(alias = "rm")]
    Remove {
        /// Cache key
        key: String,
    },

    /// List cached keys
    Keys,

    /// Show the approximate cache size in bytes
    Size,

    /// Delete expired entries
    Sweep,
}
