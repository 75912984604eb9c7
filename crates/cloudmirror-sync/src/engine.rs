//! Scan-and-sync engine
//!
//! The [`SyncEngine`] mirrors the local tree under the mount root into the
//! remote store, one cycle per [`run_once`](SyncEngine::run_once) call.
//!
//! ## Sync Flow
//!
//! 1. **Scan**: walk the mount tree depth-first (directories before the
//!    files they contain)
//! 2. **Classify**: fingerprint each file and compare with its sync record
//!    - no record, or no remote id yet: resolve the parent folder, create
//!    - fingerprint differs: update content
//!    - fingerprint matches: skip
//! 3. **Record**: after a confirmed remote success, upsert the sync record
//!    and append to the cycle's session log
//!
//! ## Failure Handling
//!
//! A file that cannot be read or synced is counted as failed, its record is
//! left untouched, and the cycle moves on; the next cycle retries it.
//! `Unauthorized` aborts the cycle as [`SyncError::AuthExpired`]. Any state
//! store error aborts the cycle as [`SyncError::StateStore`].
//!
//! ## Concurrency
//!
//! Files are processed one at a time and cycles never overlap: `run_once`
//! holds the engine's cycle lock for its whole duration. Cancellation is
//! checked between files, so an in-flight upload and its record write
//! always finish together.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cloudmirror_core::config::{Config, TransferLimits};
use cloudmirror_core::domain::{
    CycleReport, FileId, Fingerprint, FolderId, LocalEntry, SessionAction, SessionLog, SyncRecord,
};
use cloudmirror_core::ports::{IRemoteStore, ISyncStateStore, UploadSource};

use crate::resolver::FolderResolver;
use crate::retry::{call_with_retry, RetryPolicy};
use crate::scanner::{FingerprintCache, LocalScanner};
use crate::SyncError;

// ============================================================================
// Settings and outcome
// ============================================================================

/// Engine knobs derived from [`Config`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub root_folder: FolderId,
    pub retry: RetryPolicy,
    pub adopt_existing: bool,
    pub trust_mtime: bool,
    pub transfer: TransferLimits,
}

impl EngineSettings {
    /// # Errors
    /// Returns [`SyncError::Domain`] when the root folder id is malformed
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        Ok(Self {
            root_folder: config.sync.root_folder_id()?,
            retry: RetryPolicy::from_config(&config.remote),
            adopt_existing: config.sync.adopt_existing,
            trust_mtime: config.sync.trust_mtime,
            transfer: config.remote.transfer_limits(),
        })
    }

    /// Retry policy for uploading `content`, with the deadline covering
    /// every request of a chunked transfer
    pub fn upload_policy(&self, content: &UploadSource) -> RetryPolicy {
        self.retry.spanning(self.transfer.requests_for(content.len()))
    }
}

/// Result of one completed (or cancelled) cycle
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub report: CycleReport,
    pub session_log: SessionLog,
}

/// What happened to a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAction {
    Uploaded,
    Updated,
    Skipped,
}

/// State carried from one cycle to the next
#[derive(Default)]
struct CycleState {
    fingerprints: FingerprintCache,
    completed: u64,
}

// ============================================================================
// CycleRunner
// ============================================================================

/// Something that can run a sync cycle
///
/// Implemented by [`SyncEngine`]; the scheduler depends on this trait only.
#[async_trait::async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_once(&self, cancel: &CancellationToken) -> Result<CycleOutcome, SyncError>;
}

// ============================================================================
// SyncEngine
// ============================================================================

pub struct SyncEngine {
    scanner: LocalScanner,
    store: Arc<dyn ISyncStateStore>,
    remote: Arc<dyn IRemoteStore>,
    resolver: FolderResolver,
    settings: EngineSettings,
    state: Mutex<CycleState>,
}

impl SyncEngine {
    pub fn new(
        scanner: LocalScanner,
        store: Arc<dyn ISyncStateStore>,
        remote: Arc<dyn IRemoteStore>,
        settings: EngineSettings,
    ) -> Self {
        let resolver = FolderResolver::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            settings.root_folder.clone(),
            settings.retry,
            settings.adopt_existing,
        );

        Self {
            scanner,
            store,
            remote,
            resolver,
            settings,
            state: Mutex::new(CycleState::default()),
        }
    }

    /// Build an engine from configuration
    pub fn from_config(
        config: &Config,
        store: Arc<dyn ISyncStateStore>,
        remote: Arc<dyn IRemoteStore>,
    ) -> Result<Self, SyncError> {
        let scanner = LocalScanner::from_config(&config.sync)?
            .with_stream_threshold(config.remote.resumable_threshold_bytes);
        let settings = EngineSettings::from_config(config)?;
        Ok(Self::new(scanner, store, remote, settings))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one scan-and-sync cycle
    ///
    /// # Errors
    /// Returns [`SyncError::AuthExpired`] or [`SyncError::StateStore`] when
    /// the cycle had to be aborted. File-level failures are reported in the
    /// returned [`CycleReport`] instead.
    #[tracing::instrument(skip(self, cancel), fields(root = %self.scanner.root().display()))]
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<CycleOutcome, SyncError> {
        let mut state = self.state.lock().await;
        let start = Instant::now();
        let mut outcome = CycleOutcome::default();

        info!(cycle = state.completed + 1, "Starting sync cycle");

        let scan = self.scanner.scan().await;
        if !scan.root_exists {
            warn!("Mount path missing, nothing to sync this cycle");
        }

        for err in scan.errors {
            let msg = err.to_string();
            warn!(%msg, "Scan error");
            outcome.report.record_failure(msg);
        }

        for entry in scan.entries.iter().filter(|e| !e.is_directory) {
            if cancel.is_cancelled() {
                info!("Shutdown requested, stopping cycle between files");
                outcome.report.cancelled = true;
                break;
            }

            match self
                .sync_file(entry, &mut state.fingerprints, &mut outcome.session_log, cancel)
                .await
            {
                Ok(FileAction::Uploaded) => outcome.report.uploaded += 1,
                Ok(FileAction::Updated) => outcome.report.updated += 1,
                Ok(FileAction::Skipped) => outcome.report.skipped += 1,
                Err(err) if err.is_file_level() => {
                    let msg = format!("{}: {err}", entry.relative_path);
                    warn!(%msg);
                    outcome.report.record_failure(msg);
                }
                Err(err) => {
                    error!(
                        path = %entry.relative_path,
                        error = %err,
                        "Sync cycle aborted"
                    );
                    return Err(err);
                }
            }
        }

        outcome.report.duration_ms = start.elapsed().as_millis() as u64;
        state.completed += 1;

        info!(
            uploaded = outcome.report.uploaded,
            updated = outcome.report.updated,
            skipped = outcome.report.skipped,
            failed = outcome.report.failed,
            cancelled = outcome.report.cancelled,
            duration_ms = outcome.report.duration_ms,
            "Sync cycle completed"
        );

        Ok(outcome)
    }

    /// Decide and perform the action for one file
    async fn sync_file(
        &self,
        entry: &LocalEntry,
        fingerprints: &mut FingerprintCache,
        log: &mut SessionLog,
        cancel: &CancellationToken,
    ) -> Result<FileAction, SyncError> {
        let path = &entry.relative_path;
        let record = self
            .store
            .get_record(path)
            .await
            .map_err(SyncError::store)?;

        if self.settings.trust_mtime {
            if let (Some(record), Some(cached)) = (&record, fingerprints.lookup(entry)) {
                if record.has_remote() && !record.is_stale(cached) {
                    debug!(path = %path, "Unchanged size and mtime, skipping");
                    return Ok(FileAction::Skipped);
                }
            }
        }

        let (content, fingerprint) = self.scanner.load(entry).await?;
        fingerprints.remember(entry, fingerprint.clone());

        match record {
            Some(record) if record.has_remote() => {
                if !record.is_stale(&fingerprint) {
                    debug!(path = %path, "Fingerprint unchanged, skipping");
                    return Ok(FileAction::Skipped);
                }

                let Some(file_id) = record.remote_file_id().cloned() else {
                    return Ok(FileAction::Skipped);
                };
                self.update_content(entry, &file_id, &content, cancel)
                    .await?;

                let updated = record.with_update(fingerprint.clone(), Utc::now());
                self.persist(&updated, &file_id).await?;

                log.record(path.clone(), SessionAction::Updated);
                info!(
                    path = %path,
                    file_id = %file_id,
                    fingerprint = fingerprint.short(),
                    "Updated remote file"
                );
                Ok(FileAction::Updated)
            }
            _ => self.create(entry, &content, fingerprint, log, cancel).await,
        }
    }

    /// First upload of a file (or adoption of a same-named remote file)
    async fn create(
        &self,
        entry: &LocalEntry,
        content: &UploadSource,
        fingerprint: Fingerprint,
        log: &mut SessionLog,
        cancel: &CancellationToken,
    ) -> Result<FileAction, SyncError> {
        let path = &entry.relative_path;
        let parent = self.resolver.resolve(&entry.parent_dir(), cancel).await?;
        let name = entry.name();
        let remote = self.remote.as_ref();
        let parent_ref = &parent;

        if self.settings.adopt_existing {
            let existing = call_with_retry("find_file", &self.settings.retry, cancel, move || {
                remote.find_file(parent_ref, name)
            })
            .await
            .map_err(|e| SyncError::remote("find_file", path, e))?;

            if let Some(file_id) = existing {
                self.update_content(entry, &file_id, content, cancel).await?;
                let record = SyncRecord::uploaded(path.clone(), file_id.clone(), fingerprint, Utc::now());
                self.persist(&record, &file_id).await?;

                log.record(path.clone(), SessionAction::Updated);
                info!(path = %path, file_id = %file_id, "Adopted and updated existing remote file");
                return Ok(FileAction::Updated);
            }
        }

        let policy = self.settings.upload_policy(content);
        let file_id = call_with_retry("create_file", &policy, cancel, move || {
            remote.create_file(parent_ref, name, content)
        })
        .await
        .map_err(|e| SyncError::remote("create_file", path, e))?;

        let record = SyncRecord::uploaded(path.clone(), file_id.clone(), fingerprint.clone(), Utc::now());
        self.persist(&record, &file_id).await?;

        log.record(path.clone(), SessionAction::Uploaded);
        info!(
            path = %path,
            file_id = %file_id,
            fingerprint = fingerprint.short(),
            "Uploaded new file"
        );
        Ok(FileAction::Uploaded)
    }

    async fn update_content(
        &self,
        entry: &LocalEntry,
        file_id: &FileId,
        content: &UploadSource,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let remote = self.remote.as_ref();
        let policy = self.settings.upload_policy(content);
        let revision = call_with_retry(
            "update_file_content",
            &policy,
            cancel,
            move || remote.update_file_content(file_id, content),
        )
        .await
        .map_err(|e| SyncError::remote("update_file_content", &entry.relative_path, e))?;

        debug!(path = %entry.relative_path, revision = %revision, "Content replaced");
        Ok(())
    }

    /// Upsert a record after a remote success
    ///
    /// A failure here means the remote side changed but the store does not
    /// know it; the inconsistency is logged and the cycle aborted.
    async fn persist(&self, record: &SyncRecord, file_id: &FileId) -> Result<(), SyncError> {
        self.store.put_record(record).await.map_err(|err| {
            error!(
                path = %record.relative_path(),
                file_id = %file_id,
                error = %err,
                "Remote change succeeded but sync record could not be saved; state store is inconsistent"
            );
            SyncError::store(err)
        })
    }
}

#[async_trait::async_trait]
impl CycleRunner for SyncEngine {
    async fn run_once(&self, cancel: &CancellationToken) -> Result<CycleOutcome, SyncError> {
        SyncEngine::run_once(self, cancel).await
    }
}
