//! Command implementations for offline-sync.
//!
//! Each command returns the text to print; `main` prints it.

mod cache;
mod queue;

pub use cache::cache;
pub use queue::queue;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cache::OfflineCache;
use crate::cli::args::{Cli, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::{StorageError, SyncError};
use crate::storage::{self, KeyValueStore};
use crate::sync::{spawn_cache_sweeper, ExecutorRegistry, SyncOrchestrator};

/// Everything a command needs: settings, resolved paths and the open store.
pub struct Context {
    /// Loaded configuration
    pub config: Config,
    /// Data directory layout
    pub paths: Paths,
    /// Output format after applying the configured default
    pub format: OutputFormat,
    store: Arc<dyn KeyValueStore>,
}

impl Context {
    /// Load configuration and open the configured store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or the data
    /// directory cannot be created.
    pub fn open(config_path: Option<&Path>, output: Option<OutputFormat>) -> Result<Self, SyncError> {
        let paths = Paths::new()?;
        let config_file: PathBuf = config_path.map_or_else(|| paths.config_file.clone(), Path::to_path_buf);
        let config = Config::load_from_path(&config_file)?;
        config.general.color.apply();
        paths.ensure_dirs()?;

        let format = output.unwrap_or(config.general.default_output);
        Ok(Self::new(config, paths, format))
    }

    /// Open the store described by `config` under `paths`.
    #[must_use]
    pub fn new(config: Config, paths: Paths, format: OutputFormat) -> Self {
        let store = storage::open(&config.storage, &paths);
        Self {
            config,
            paths,
            format,
            store,
        }
    }

    /// The open store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    /// Build the orchestrator with the configured executors and retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn orchestrator(&self) -> Result<SyncOrchestrator, SyncError> {
        SyncOrchestrator::builder(self.store())
            .executors(ExecutorRegistry::from_commands(&self.config.executors))
            .retry_policy(self.config.retry.clone())
            .cache(self.cache())
            .build()
    }

    /// Fail unless writes are reaching the durable store.
    ///
    /// A degraded store only lives as long as this process, so anything
    /// written to it is lost when the command exits.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the store has fallen back to memory.
    pub fn require_durable(&self) -> Result<(), SyncError> {
        if self.store.is_degraded() {
            return Err(StorageError::Unavailable(format!(
                "{:?} store could not be used, nothing was saved (run with --verbose for details)",
                self.config.storage.backend
            ))
            .into());
        }
        Ok(())
    }

    /// The read cache over the open store.
    #[must_use]
    pub fn cache(&self) -> OfflineCache {
        OfflineCache::new(self.store())
    }
}

/// Drain periodically and sweep the cache until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the orchestrator cannot be built or the first drain
/// fails.
pub async fn watch(ctx: &Context, interval_secs: u64) -> Result<String, SyncError> {
    if interval_secs == 0 {
        return Err(SyncError::InvalidInput(
            "--interval must be at least 1 second".to_string(),
        ));
    }
    let orchestrator = ctx.orchestrator()?;
    let first = orchestrator.sync_now().await?;
    tracing::info!(processed = first.processed, "Initial drain finished");

    let sweep_minutes = u64::from(ctx.config.cache.sweep_interval_minutes.max(1));
    let sweep_every = Duration::from_secs(sweep_minutes * 60);
    let sync_task = orchestrator.spawn_periodic_sync(Duration::from_secs(interval_secs));
    let sweep_task = spawn_cache_sweeper(ctx.cache(), sweep_every);

    tokio::signal::ctrl_c().await?;
    sync_task.abort();
    sweep_task.abort();

    let stats = orchestrator.stats()?;
    Ok(format!(
        "Stopped watching ({} pending, {} failed)",
        stats.pending, stats.failed
    ))
}

/// Generate a shell completion script.
///
/// # Errors
///
/// Returns an error if the script is not valid UTF-8.
pub fn completions(shell: Shell) -> Result<String, SyncError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "offline-sync", &mut buf);
    String::from_utf8(buf).map_err(|e| SyncError::Parse(format!("UTF-8 error: {e}")))
}
