//! Session provider port
//!
//! Supplies the bearer token used by remote store adapters. Acquiring and
//! refreshing tokens happens outside the sync engine; a provider only hands
//! out what it currently holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::remote_store::RemoteError;

/// OAuth tokens for the remote store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token, when the issuer provided one
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

/// Source of the current access token
#[async_trait::async_trait]
pub trait ISessionProvider: Send + Sync {
    /// Current access token
    ///
    /// Returns [`RemoteError::Unauthorized`] when no usable token exists.
    async fn access_token(&self) -> Result<String, RemoteError>;
}
