//! Remote store port (driven/secondary port)
//!
//! The sync engine mirrors local files into a remote object store through
//! this trait. Implementations are expected to be authenticated already;
//! retries and per-call timeouts are applied by the caller.
//!
//! ## Design Notes
//!
//! - Unlike the state store port, errors are classified with [`RemoteError`]
//!   because the engine reacts differently to each kind (abort on
//!   `Unauthorized`, back off on `RateLimited`, fail the file otherwise).
//! - `find_folder` and `find_file` have default implementations returning
//!   `Ok(None)` so minimal stores only need the three mutating operations.
//! - File content arrives as an [`UploadSource`]. Large files stay on disk
//!   and the store reads them piece by piece while uploading.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::newtypes::{FileId, FolderId, RevisionId};

/// Failure of a remote store call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Credentials are missing, expired or revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The store asked us to slow down
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Server-provided delay hint
        retry_after: Option<Duration>,
    },

    /// The referenced parent folder or file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connection failure or server-side error
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The call did not complete within the allotted time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The request was refused for a reason retrying will not fix
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The local content could not be read while uploading
    #[error("Upload source unreadable: {0}")]
    SourceUnreadable(String),
}

impl RemoteError {
    /// Errors worth another attempt with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::RateLimited { .. }
                | RemoteError::TransientNetwork(_)
                | RemoteError::Timeout(_)
        )
    }

    /// Returns true for authentication failures
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }

    /// Delay hint carried by a rate-limit response
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Content handed to [`IRemoteStore::create_file`] and
/// [`IRemoteStore::update_file_content`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// Bytes already in memory
    Memory(Vec<u8>),
    /// `len` bytes of a local file, read while uploading
    File { path: PathBuf, len: u64 },
}

impl UploadSource {
    pub fn len(&self) -> u64 {
        match self {
            UploadSource::Memory(bytes) => bytes.len() as u64,
            UploadSource::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// In-memory bytes, if this source holds them
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            UploadSource::Memory(bytes) => Some(bytes),
            UploadSource::File { .. } => None,
        }
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(bytes: Vec<u8>) -> Self {
        UploadSource::Memory(bytes)
    }
}

impl From<&[u8]> for UploadSource {
    fn from(bytes: &[u8]) -> Self {
        UploadSource::Memory(bytes.to_vec())
    }
}

/// Remote object store holding the mirrored hierarchy
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Create a folder named `name` inside `parent`
    async fn create_folder(&self, parent: &FolderId, name: &str) -> Result<FolderId, RemoteError>;

    /// Create a file named `name` inside `parent` with the given content
    async fn create_file(
        &self,
        parent: &FolderId,
        name: &str,
        content: &UploadSource,
    ) -> Result<FileId, RemoteError>;

    /// Replace the content of an existing file
    async fn update_file_content(
        &self,
        file: &FileId,
        content: &UploadSource,
    ) -> Result<RevisionId, RemoteError>;

    /// Look up an existing child folder by name
    async fn find_folder(
        &self,
        _parent: &FolderId,
        _name: &str,
    ) -> Result<Option<FolderId>, RemoteError> {
        Ok(None)
    }

    /// Look up an existing child file by name
    async fn find_file(
        &self,
        _parent: &FolderId,
        _name: &str,
    ) -> Result<Option<FileId>, RemoteError> {
        Ok(None)
    }
}
