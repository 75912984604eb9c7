//! Access tokens for the Drive API
//!
//! Token acquisition happens outside cloudmirror: an operator stores a token
//! (`cloudmirror auth set-token`) or exports one in an environment variable.
//! This module keeps that token in the OS keyring and hands it to the
//! [`DriveClient`](crate::client::DriveClient) through [`ISessionProvider`].
//!
//! - [`KeyringTokenStorage`] - JSON-serialised [`Tokens`] under service `cloudmirror`
//! - [`KeyringTokenProvider`] - reads the keyring on every call
//! - [`StaticTokenProvider`] - a fixed token, typically from the environment

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use cloudmirror_core::config::AuthConfig;
use cloudmirror_core::ports::{ISessionProvider, RemoteError, Tokens};

/// Keyring service name for stored tokens
const KEYRING_SERVICE: &str = "cloudmirror";

// ============================================================================
// KeyringTokenStorage
// ============================================================================

/// Tokens stored in the system keyring under one user name
#[derive(Debug, Clone)]
pub struct KeyringTokenStorage {
    user: String,
}

impl KeyringTokenStorage {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &self.user).context("Failed to open keyring entry")
    }

    pub fn store(&self, tokens: &Tokens) -> Result<()> {
        let json = serde_json::to_string(tokens).context("Failed to serialize tokens")?;
        self.entry()?
            .set_password(&json)
            .context("Failed to store tokens in keyring")?;
        debug!(user = %self.user, "Stored tokens in keyring");
        Ok(())
    }

    /// `Ok(None)` when nothing is stored for this user
    pub fn load(&self) -> Result<Option<Tokens>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let tokens = serde_json::from_str(&json)
                    .context("Stored keyring entry is not a valid token set")?;
                Ok(Some(tokens))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    /// Remove stored tokens; succeeds when there were none
    pub fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                info!(user = %self.user, "Cleared tokens from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(user = %self.user, "No tokens to clear");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

// ============================================================================
// Session providers
// ============================================================================

/// Reads the keyring each time a token is needed
///
/// A token stored while the daemon is running is picked up by the next
/// request without a restart.
pub struct KeyringTokenProvider {
    storage: KeyringTokenStorage,
}

impl KeyringTokenProvider {
    pub fn new(storage: KeyringTokenStorage) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl ISessionProvider for KeyringTokenProvider {
    async fn access_token(&self) -> Result<String, RemoteError> {
        let storage = self.storage.clone();
        let loaded = tokio::task::spawn_blocking(move || storage.load())
            .await
            .map_err(|e| RemoteError::Unauthorized(format!("keyring lookup aborted: {e}")))?;

        match loaded {
            Ok(Some(tokens)) if tokens.is_expired() => Err(RemoteError::Unauthorized(format!(
                "stored token expired at {}",
                tokens.expires_at
            ))),
            Ok(Some(tokens)) => Ok(tokens.access_token),
            Ok(None) => Err(RemoteError::Unauthorized(format!(
                "no token stored for '{}'",
                self.storage.user()
            ))),
            Err(err) => Err(RemoteError::Unauthorized(format!("{err:#}"))),
        }
    }
}

/// Always returns the same token
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl ISessionProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, RemoteError> {
        if self.token.is_empty() {
            return Err(RemoteError::Unauthorized("empty access token".into()));
        }
        Ok(self.token.clone())
    }
}

/// Pick the session provider for `auth`
///
/// A non-empty `auth.token_env` variable wins over the keyring.
pub fn session_provider_from_config(auth: &AuthConfig) -> Arc<dyn ISessionProvider> {
    match std::env::var(&auth.token_env) {
        Ok(token) if !token.trim().is_empty() => {
            info!(env = %auth.token_env, "Using access token from environment");
            Arc::new(StaticTokenProvider::new(token.trim()))
        }
        Ok(_) => {
            warn!(env = %auth.token_env, "Token variable is empty, falling back to keyring");
            Arc::new(KeyringTokenProvider::new(KeyringTokenStorage::new(
                auth.keyring_user.clone(),
            )))
        }
        Err(_) => Arc::new(KeyringTokenProvider::new(KeyringTokenStorage::new(
            auth.keyring_user.clone(),
        ))),
    }
}
