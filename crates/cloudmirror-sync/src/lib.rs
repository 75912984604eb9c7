//! cloudmirror sync - one-way local-to-remote mirroring engine
//!
//! Provides:
//! - Depth-first scanning of the mount tree
//! - Lazy, outer-to-inner remote folder resolution backed by the state store
//! - Fingerprint-based create/update/skip decisions per file
//! - Retries with backoff and a timeout around every remote call
//! - A scheduler that repeats cycles, optionally woken early by a watcher
//!
//! ## Modules
//!
//! - [`engine`] - [`SyncEngine::run_once`](engine::SyncEngine::run_once), one scan-and-sync cycle
//! - [`resolver`] - maps local directories to remote folder ids
//! - [`retry`] - timeout and exponential backoff around remote calls
//! - [`scanner`] - local tree walk and content loading
//! - [`scheduler`] - cycle loop with graceful shutdown
//! - [`watcher`] - `notify`-based change detection with debouncing

pub mod engine;
pub mod resolver;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod watcher;

pub use engine::{CycleOutcome, CycleRunner, EngineSettings, SyncEngine};
pub use retry::RetryPolicy;
pub use scanner::LocalScanner;
pub use scheduler::{CycleScheduler, SchedulerSummary};
pub use watcher::{ChangeEvent, FileWatcher};

use std::path::PathBuf;

use thiserror::Error;

use cloudmirror_core::domain::errors::DomainError;
use cloudmirror_core::ports::RemoteError;

/// Errors that can occur during synchronization
///
/// File-level errors ([`is_file_level`](SyncError::is_file_level)) fail a
/// single file and let the cycle continue. The rest abort the cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local file or directory could not be read
    #[error("Local I/O error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A remote call failed after retries
    #[error("Remote {operation} failed for '{path}': {source}")]
    RemoteOperation {
        operation: &'static str,
        path: String,
        #[source]
        source: RemoteError,
    },

    /// The remote store rejected our credentials
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// The state store could not be read or written
    #[error("State store error: {0}")]
    StateStore(String),

    /// A domain-level error propagated from cloudmirror-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Map a remote failure, turning `Unauthorized` into [`SyncError::AuthExpired`]
    pub fn remote(operation: &'static str, path: impl ToString, source: RemoteError) -> Self {
        match source {
            RemoteError::Unauthorized(msg) => SyncError::AuthExpired(msg),
            other => SyncError::RemoteOperation {
                operation,
                path: path.to_string(),
                source: other,
            },
        }
    }

    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Wrap a state store failure, keeping the full context chain
    pub fn store(err: anyhow::Error) -> Self {
        SyncError::StateStore(format!("{err:#}"))
    }

    /// True for errors that only affect the current file
    pub fn is_file_level(&self) -> bool {
        matches!(
            self,
            SyncError::LocalIo { .. } | SyncError::RemoteOperation { .. } | SyncError::Domain(_)
        )
    }
}
