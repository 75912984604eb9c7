//! cloudmirror Drive - Google Drive v3 remote store
//!
//! Provides:
//! - [`DriveClient`](client::DriveClient), the production
//!   [`IRemoteStore`](cloudmirror_core::ports::IRemoteStore) adapter
//! - Token storage in the OS keyring and the session providers that read it
//!
//! ## Modules
//!
//! - [`auth`] - keyring token storage and session providers
//! - [`client`] - Drive v3 HTTP client (folders, simple and resumable uploads)
//! - [`rate_limit`] - throttling detection and `Retry-After` parsing

pub mod auth;
pub mod client;
pub mod rate_limit;

pub use auth::{session_provider_from_config, KeyringTokenProvider, KeyringTokenStorage, StaticTokenProvider};
pub use client::DriveClient;

use std::time::Duration;

use thiserror::Error;

use cloudmirror_core::ports::RemoteError;

/// Errors that can occur when talking to the Drive API
#[derive(Debug, Error)]
pub enum DriveError {
    /// Missing, expired or revoked credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Permission denied for reasons other than throttling
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The referenced file or folder does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 429, or 403 with a rate-limit reason
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// 5xx from the API
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Any other non-success status
    #[error("Request rejected with {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Connection, TLS or body transfer failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A success response without the fields we asked for
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A single request exceeded the request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A resumable session stopped acknowledging new bytes
    #[error("Upload session made no progress at byte {offset}")]
    UploadStalled { offset: u64 },

    /// The local content of an upload could not be read
    #[error("Cannot read upload source: {0}")]
    Source(#[from] std::io::Error),
}

impl From<DriveError> for RemoteError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::Unauthorized(msg) => RemoteError::Unauthorized(msg),
            DriveError::NotFound(msg) => RemoteError::NotFound(msg),
            DriveError::RateLimited { retry_after } => RemoteError::RateLimited { retry_after },
            DriveError::Timeout(after) => RemoteError::Timeout(after),
            DriveError::ServerError { .. } | DriveError::Network(_) | DriveError::UploadStalled { .. } => {
                RemoteError::TransientNetwork(err.to_string())
            }
            DriveError::Source(_) => RemoteError::SourceUnreadable(err.to_string()),
            DriveError::Forbidden(_) | DriveError::Rejected { .. } | DriveError::InvalidResponse(_) => {
                RemoteError::Rejected(err.to_string())
            }
        }
    }
}
