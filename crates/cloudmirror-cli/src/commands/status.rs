//! Status command - show what the state store knows
//!
//! Provides the `cloudmirror status` CLI command which prints the store
//! counts, the synced file records (optionally under a path prefix) and the
//! remote folder references. Nothing is sent to the remote store.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use cloudmirror_cache::{DatabasePool, SqliteStateStore};
use cloudmirror_core::domain::{RelativePath, RemoteFolderRef, SyncRecord};
use cloudmirror_core::ports::{ISyncStateStore, RecordFilter, StoreCounts};

use super::load_lenient;
use crate::output::{plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only show records under this mount-relative path
    #[arg(long)]
    pub prefix: Option<String>,

    /// Maximum number of records to show
    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    /// Also list remote folder references
    #[arg(long)]
    pub folders: bool,
}

impl StatusCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = format.formatter();
        let config = load_lenient(config_path)?;
        let db_path = &config.state.database_path;

        if !db_path.exists() {
            formatter.warn(&format!(
                "No sync state at {}. Run 'cloudmirror sync' or start cloudmirrord first.",
                db_path.display()
            ));
            return Ok(());
        }

        let filter = self.filter()?;
        let pool = DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open state database at {}", db_path.display()))?;
        let store = SqliteStateStore::new(pool.pool().clone());

        info!(db = %db_path.display(), "Reading sync state");
        let snapshot = StatusSnapshot::load(&store, &filter, self.folders).await;
        pool.close().await;
        let snapshot = snapshot?;

        if format.is_json() {
            formatter.print_json(&snapshot.to_json(&config.sync.mount_path));
        } else {
            snapshot.print(&*formatter, &config.sync.mount_path);
        }
        Ok(())
    }

    fn filter(&self) -> Result<RecordFilter> {
        let mut filter = RecordFilter::new().with_limit(self.limit);
        if let Some(prefix) = &self.prefix {
            let prefix: RelativePath = prefix
                .trim_matches('/')
                .parse()
                .with_context(|| format!("Invalid prefix '{prefix}'"))?;
            if !prefix.is_root() {
                filter = filter.with_path_prefix(prefix);
            }
        }
        Ok(filter)
    }
}

struct StatusSnapshot {
    counts: StoreCounts,
    records: Vec<SyncRecord>,
    folders: Vec<RemoteFolderRef>,
}

impl StatusSnapshot {
    async fn load(
        store: &dyn ISyncStateStore,
        filter: &RecordFilter,
        with_folders: bool,
    ) -> Result<Self> {
        let counts = store.counts().await?;
        let records = store.list_records(filter).await?;
        let folders = if with_folders {
            store.list_folder_refs().await?
        } else {
            Vec::new()
        };
        Ok(Self {
            counts,
            records,
            folders,
        })
    }

    fn to_json(&self, mount: &Path) -> serde_json::Value {
        serde_json::json!({
            "mount_path": mount.display().to_string(),
            "counts": self.counts,
            "records": self.records,
            "folders": self.folders,
        })
    }

    fn print(&self, formatter: &dyn OutputFormatter, mount: &Path) {
        formatter.success(&format!("Mirroring {}", mount.display()));
        formatter.info(&format!(
            "{} synced, {} tracked, {} remote",
            plural(self.counts.synced_files, "file"),
            plural(self.counts.sync_records, "record"),
            plural(self.counts.folder_refs, "folder"),
        ));

        if !self.records.is_empty() {
            formatter.info("");
            for record in &self.records {
                let synced = record
                    .last_synced_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string());
                let fingerprint = record.last_fingerprint().map(|f| f.short()).unwrap_or("-");
                formatter.info(&format!(
                    "{synced}  {fingerprint:<12} {}",
                    record.relative_path()
                ));
            }
        }

        if !self.folders.is_empty() {
            formatter.info("");
            for folder in &self.folders {
                let path = if folder.relative_path().is_root() {
                    "/"
                } else {
                    folder.relative_path().as_str()
                };
                formatter.info(&format!("{path}/  -> {}", folder.folder_id()));
            }
        }
    }
}
