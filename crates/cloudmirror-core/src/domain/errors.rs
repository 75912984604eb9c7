//! Domain error types
//!
//! Validation failures raised while constructing domain values such as
//! relative paths, remote identifiers and content fingerprints.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path is not located under the mount root
    #[error("Path not within mount root: {0}")]
    PathNotInMountRoot(String),

    /// Invalid remote identifier (folder, file or revision)
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid content fingerprint
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
