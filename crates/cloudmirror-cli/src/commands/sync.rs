//! Sync command - run one mirroring cycle in the foreground
//!
//! Provides the `cloudmirror sync` CLI command which:
//! 1. Loads and validates configuration and opens the state database
//! 2. Builds the Drive client from the configured token source
//! 3. Runs a single `SyncEngine::run_once` cycle (Ctrl+C stops between files)
//! 4. Prints the cycle report and the session log

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cloudmirror_cache::{DatabasePool, SqliteStateStore};
use cloudmirror_core::domain::{CycleReport, SessionLog};
use cloudmirror_core::ports::ISyncStateStore;
use cloudmirror_drive::{session_provider_from_config, DriveClient};
use cloudmirror_sync::{CycleOutcome, SyncEngine, SyncError};

use super::load_validated;
use crate::output::{plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Print every uploaded or updated path
    #[arg(long)]
    pub list: bool,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = format.formatter();
        let config = load_validated(config_path)?;

        let pool = DatabasePool::new(&config.state.database_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open state database at {}",
                    config.state.database_path.display()
                )
            })?;
        let store: Arc<dyn ISyncStateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));
        let session = session_provider_from_config(&config.auth);
        let remote = Arc::new(DriveClient::from_config(&config.remote, session));

        let engine = SyncEngine::from_config(&config, store, remote)
            .context("Failed to build sync engine")?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, finishing the current file");
                on_interrupt.cancel();
            }
        });

        formatter.info(&format!(
            "Mirroring {} ...",
            config.sync.mount_path.display()
        ));
        let result = engine.run_once(&cancel).await;
        pool.close().await;

        match result {
            Ok(outcome) => {
                if format.is_json() {
                    formatter.print_json(&outcome_json(&outcome));
                } else {
                    print_report(&*formatter, &outcome.report);
                    if self.list {
                        print_session_log(&*formatter, &outcome.session_log);
                    }
                }
                if outcome.report.failed > 0 {
                    anyhow::bail!(
                        "{} could not be mirrored",
                        plural(outcome.report.failed, "file")
                    );
                }
                Ok(())
            }
            Err(SyncError::AuthExpired(msg)) => {
                formatter.error(&format!("Authorization expired: {msg}"));
                formatter.info("Store a fresh token with 'cloudmirror auth set-token <TOKEN>'.");
                anyhow::bail!("sync aborted: authorization expired")
            }
            Err(e) => Err(anyhow::Error::new(e).context("Sync cycle failed")),
        }
    }
}

fn outcome_json(outcome: &CycleOutcome) -> serde_json::Value {
    serde_json::json!({
        "success": outcome.report.failed == 0,
        "report": outcome.report,
        "session_log": outcome.session_log.entries(),
    })
}

fn print_report(formatter: &dyn OutputFormatter, report: &CycleReport) {
    let elapsed = format!("{:.1}s", report.duration_ms as f64 / 1000.0);

    if report.cancelled {
        formatter.warn(&format!("Cycle interrupted after {elapsed}"));
    } else if !report.changed_anything() && report.failed == 0 {
        formatter.success(&format!("Already up to date ({elapsed})"));
    } else {
        formatter.success(&format!("Cycle completed in {elapsed}"));
    }

    formatter.info(&format!("Uploaded: {}", report.uploaded));
    formatter.info(&format!("Updated:  {}", report.updated));
    formatter.info(&format!("Skipped:  {}", report.skipped));
    formatter.info(&format!("Failed:   {}", report.failed));

    if !report.errors.is_empty() {
        formatter.error(&format!(
            "{} during the cycle:",
            plural(report.errors.len() as u64, "error")
        ));
        for err in &report.errors {
            formatter.info(&format!("  - {err}"));
        }
    }
}

fn print_session_log(formatter: &dyn OutputFormatter, log: &SessionLog) {
    if log.is_empty() {
        return;
    }
    formatter.info("");
    for entry in log.entries() {
        formatter.info(&format!(
            "{}  {:<8} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.action.to_string(),
            entry.relative_path
        ));
    }
}
