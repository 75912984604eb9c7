//! Persisted sync state entities
//!
//! [`SyncRecord`] remembers what was last uploaded for one local file and
//! [`RemoteFolderRef`] remembers which remote folder mirrors one local
//! directory. Both are keyed by [`RelativePath`] and owned by the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{FileId, Fingerprint, FolderId, RelativePath};

/// Last known sync state of one local file
///
/// `remote_file_id` is only present once a remote create has succeeded, and
/// `last_fingerprint` always describes the content of the last successful
/// create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    relative_path: RelativePath,
    remote_file_id: Option<FileId>,
    last_fingerprint: Option<Fingerprint>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl SyncRecord {
    /// Record for a file that has just been created remotely
    pub fn uploaded(
        relative_path: RelativePath,
        remote_file_id: FileId,
        fingerprint: Fingerprint,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            relative_path,
            remote_file_id: Some(remote_file_id),
            last_fingerprint: Some(fingerprint),
            last_synced_at: Some(synced_at),
        }
    }

    /// Rebuild a record from stored columns
    pub fn from_parts(
        relative_path: RelativePath,
        remote_file_id: Option<FileId>,
        last_fingerprint: Option<Fingerprint>,
        last_synced_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            relative_path,
            remote_file_id,
            last_fingerprint,
            last_synced_at,
        }
    }

    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    pub fn remote_file_id(&self) -> Option<&FileId> {
        self.remote_file_id.as_ref()
    }

    pub fn last_fingerprint(&self) -> Option<&Fingerprint> {
        self.last_fingerprint.as_ref()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// True once the file exists remotely
    pub fn has_remote(&self) -> bool {
        self.remote_file_id.is_some()
    }

    /// True if `fingerprint` differs from the last synced content
    pub fn is_stale(&self, fingerprint: &Fingerprint) -> bool {
        self.last_fingerprint.as_ref() != Some(fingerprint)
    }

    /// Copy of this record after a successful content update
    ///
    /// The remote file id is kept as is.
    #[must_use]
    pub fn with_update(&self, fingerprint: Fingerprint, synced_at: DateTime<Utc>) -> Self {
        Self {
            relative_path: self.relative_path.clone(),
            remote_file_id: self.remote_file_id.clone(),
            last_fingerprint: Some(fingerprint),
            last_synced_at: Some(synced_at),
        }
    }
}

/// Remote folder mirroring one local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolderRef {
    relative_path: RelativePath,
    folder_id: FolderId,
    created_at: DateTime<Utc>,
}

impl RemoteFolderRef {
    pub fn new(relative_path: RelativePath, folder_id: FolderId) -> Self {
        Self {
            relative_path,
            folder_id,
            created_at: Utc::now(),
        }
    }

    pub fn from_parts(
        relative_path: RelativePath,
        folder_id: FolderId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            relative_path,
            folder_id,
            created_at,
        }
    }

    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    pub fn folder_id(&self) -> &FolderId {
        &self.folder_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
