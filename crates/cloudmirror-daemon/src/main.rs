//! cloudmirror daemon - background mirroring service
//!
//! Runs as a user service and:
//! - Mirrors the mount tree into the remote root folder every scan interval
//! - Optionally wakes early on filesystem changes (`sync.watch`)
//! - Shuts down gracefully on SIGTERM/SIGINT, letting the in-flight file finish
//!
//! # Architecture
//!
//! The daemon wires the SQLite state store, the Drive client and the sync
//! engine together, then hands the engine to a `CycleScheduler`. Shutdown is
//! a single `CancellationToken` shared by the signal handler, the scheduler
//! and the engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cloudmirror_cache::{DatabasePool, SqliteStateStore};
use cloudmirror_core::config::{Config, LoggingConfig};
use cloudmirror_core::domain::SessionAction;
use cloudmirror_core::ports::ISyncStateStore;
use cloudmirror_drive::{session_provider_from_config, DriveClient};
use cloudmirror_sync::{ChangeEvent, CycleScheduler, FileWatcher, SyncEngine};

/// Environment variable overriding the config file location
const CONFIG_ENV: &str = "CLOUDMIRROR_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Open the state database
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_pool = DatabasePool::new(&config.state.database_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open state database at {}",
                    config.state.database_path.display()
                )
            })?;

        Ok(Self {
            config,
            db_pool,
            shutdown,
        })
    }

    /// Build the engine and run cycles until shutdown
    async fn run(&self) -> Result<()> {
        let store: Arc<dyn ISyncStateStore> =
            Arc::new(SqliteStateStore::new(self.db_pool.pool().clone()));
        let session = session_provider_from_config(&self.config.auth);
        let remote = Arc::new(DriveClient::from_config(&self.config.remote, session));

        let engine = SyncEngine::from_config(&self.config, Arc::clone(&store), remote)
            .context("Failed to build sync engine")?;

        match store.counts().await {
            Ok(counts) => info!(
                folders = counts.folder_refs,
                files = counts.synced_files,
                "Resuming from stored sync state"
            ),
            Err(e) => warn!(error = %format!("{e:#}"), "Could not read stored sync state"),
        }

        let mut scheduler = CycleScheduler::new(Arc::new(engine), self.config.sync.scan_interval());

        // Kept alive for the scheduler's lifetime; dropping it stops delivery
        let mut _watcher = None;
        if self.config.sync.watch {
            match self.start_watcher() {
                Ok((watcher, rx)) => {
                    scheduler = scheduler.with_changes(rx, self.config.sync.debounce());
                    _watcher = Some(watcher);
                }
                Err(e) => warn!(
                    error = %format!("{e:#}"),
                    "File watching unavailable, relying on the scan interval"
                ),
            }
        }

        let summary = scheduler.run(self.shutdown.clone()).await;
        info!(
            cycles = summary.cycles,
            failed_cycles = summary.failed_cycles,
            uploaded = summary.session_log.count(SessionAction::Uploaded),
            updated = summary.session_log.count(SessionAction::Updated),
            "Session finished"
        );

        self.db_pool.close().await;
        Ok(())
    }

    fn start_watcher(&self) -> Result<(FileWatcher, tokio::sync::mpsc::Receiver<ChangeEvent>)> {
        let (mut watcher, rx) = FileWatcher::new()?;
        watcher.watch(&self.config.sync.mount_path)?;
        Ok((watcher, rx))
    }
}

// ============================================================================
// Startup helpers
// ============================================================================

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Load and validate configuration; every validation error is fatal
fn load_config(path: &std::path::Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
        Config::default()
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration:\n  {}", listed.join("\n  "));
    }
    Ok(config)
}

/// `RUST_LOG` wins; otherwise the configured level
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Waits for SIGTERM or SIGINT and cancels `token`
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    // Logging is not configured yet; read the level leniently first
    let logging = Config::load_or_default(&path).logging;
    init_tracing(&logging);

    info!(config = %path.display(), "cloudmirror daemon starting (cloudmirrord)");
    let config = load_config(&path)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let service = DaemonService::new(config, shutdown).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("cloudmirror daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "cloudmirror daemon exiting with error"),
    }

    result
}
