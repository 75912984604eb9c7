//! Sync state store port (driven/secondary port)
//!
//! Durable mapping from local relative paths to remote identities. Every
//! mutating call must be persisted before it returns, and every upsert must
//! be atomic so a crash never leaves a record half-written.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific; the
//!   engine treats any error here as fatal for the running cycle.
//! - `RecordFilter` keeps query composition out of the storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{newtypes::RelativePath, RemoteFolderRef, SyncRecord};

/// Filter criteria for listing sync records
///
/// All fields are optional and combined with AND logic.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Records at or under this relative path
    pub path_prefix: Option<RelativePath>,
    /// Records synced at or after this timestamp
    pub synced_since: Option<DateTime<Utc>>,
    /// Maximum number of records to return
    pub limit: Option<u32>,
}

impl RecordFilter {
    /// Creates a new empty filter (matches all records)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path prefix filter
    pub fn with_path_prefix(mut self, prefix: RelativePath) -> Self {
        self.path_prefix = Some(prefix);
        self
    }

    /// Sets the synced-since filter
    pub fn with_synced_since(mut self, since: DateTime<Utc>) -> Self {
        self.synced_since = Some(since);
        self
    }

    /// Sets the result limit
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.path_prefix.is_none() && self.synced_since.is_none() && self.limit.is_none()
    }
}

/// Row counts of the state store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub folder_refs: u64,
    pub sync_records: u64,
    /// Records with a remote file id
    pub synced_files: u64,
}

/// Persistent sync state
#[async_trait::async_trait]
pub trait ISyncStateStore: Send + Sync {
    /// Fetch the record for a file, if any
    async fn get_record(&self, path: &RelativePath) -> anyhow::Result<Option<SyncRecord>>;

    /// Insert or replace the record for a file
    async fn put_record(&self, record: &SyncRecord) -> anyhow::Result<()>;

    /// Fetch the remote folder reference for a directory, if any
    async fn get_folder_ref(&self, path: &RelativePath) -> anyhow::Result<Option<RemoteFolderRef>>;

    /// Insert or replace the remote folder reference for a directory
    async fn put_folder_ref(&self, folder: &RemoteFolderRef) -> anyhow::Result<()>;

    /// List records matching the filter, ordered by path
    async fn list_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<SyncRecord>>;

    /// List all folder references, ordered by path
    async fn list_folder_refs(&self) -> anyhow::Result<Vec<RemoteFolderRef>>;

    /// Row counts for status reporting
    async fn counts(&self) -> anyhow::Result<StoreCounts>;
}
