//! Auth commands - manage the Drive access token
//!
//! Provides the `cloudmirror auth` CLI subcommands which:
//! 1. `set-token` - stores an access token (obtained elsewhere) in the system keyring
//! 2. `status`    - shows the stored token's expiry and, with `--check`,
//!    asks the Drive API for the configured root folder
//! 3. `logout`    - removes the stored token
//!
//! The token named by `auth.token_env` takes precedence over the keyring
//! when it is set; `status` reports which source the daemon will use.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Subcommand;
use tracing::info;

use cloudmirror_core::config::AuthConfig;
use cloudmirror_core::ports::Tokens;
use cloudmirror_drive::{session_provider_from_config, DriveClient, KeyringTokenStorage};

use super::{load_lenient, load_validated};
use crate::output::{OutputFormat, OutputFormatter};

/// Lifetime assumed for a token when none is given
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Store an access token in the system keyring
    SetToken {
        /// Bearer token for the Drive API
        token: String,
        /// Seconds until the token expires
        #[arg(long, default_value_t = DEFAULT_TOKEN_LIFETIME_SECS)]
        expires_in: i64,
        /// Refresh token to keep alongside the access token
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// Show the stored token and where the daemon will read it from
    Status {
        /// Verify the token against the Drive API
        #[arg(long)]
        check: bool,
    },
    /// Remove the stored token
    Logout,
}

impl AuthCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let fmt = format.formatter();
        match self {
            AuthCommand::SetToken {
                token,
                expires_in,
                refresh_token,
            } => {
                let config = load_lenient(config_path)?;
                let tokens = new_tokens(token, *expires_in, refresh_token.clone())?;
                execute_set_token(&config.auth, tokens, &*fmt, format)
            }
            AuthCommand::Status { check } => {
                execute_status(config_path, *check, &*fmt, format).await
            }
            AuthCommand::Logout => {
                let config = load_lenient(config_path)?;
                execute_logout(&config.auth, &*fmt, format)
            }
        }
    }
}

fn new_tokens(token: &str, expires_in: i64, refresh_token: Option<String>) -> Result<Tokens> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("Token must not be empty");
    }
    if expires_in <= 0 {
        anyhow::bail!("--expires-in must be positive, got {expires_in}");
    }
    Ok(Tokens {
        access_token: token.to_string(),
        refresh_token,
        expires_at: Utc::now() + Duration::seconds(expires_in),
    })
}

fn execute_set_token(
    auth: &AuthConfig,
    tokens: Tokens,
    fmt: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    let storage = KeyringTokenStorage::new(auth.keyring_user.clone());
    storage.store(&tokens)?;
    info!(user = %storage.user(), expires_at = %tokens.expires_at, "Stored access token");

    if format.is_json() {
        fmt.print_json(&serde_json::json!({
            "success": true,
            "user": storage.user(),
            "expires_at": tokens.expires_at.to_rfc3339(),
        }));
    } else {
        fmt.success(&format!("Token stored for '{}'", storage.user()));
        fmt.info(&format!("Expires: {}", tokens.expires_at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    Ok(())
}

async fn execute_status(
    config_path: &Path,
    check: bool,
    fmt: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    let config = if check {
        load_validated(config_path)?
    } else {
        load_lenient(config_path)?
    };
    let auth = &config.auth;

    let env_active = std::env::var(&auth.token_env)
        .map(|t| !t.trim().is_empty())
        .unwrap_or(false);
    let storage = KeyringTokenStorage::new(auth.keyring_user.clone());
    let stored = match storage.load() {
        Ok(stored) => stored,
        // No secret service is fine when the token comes from the environment
        Err(e) if env_active => {
            fmt.warn(&format!("{e:#}"));
            None
        }
        Err(e) => return Err(e),
    };

    let verified = if check {
        let session = session_provider_from_config(auth);
        let client = DriveClient::from_config(&config.remote, session);
        let root = config.sync.root_folder_id()?;
        Some(
            client
                .get_item(root.as_str())
                .await
                .map(|item| item.name)
                .map_err(|e| e.to_string()),
        )
    } else {
        None
    };

    if format.is_json() {
        let source = if env_active { "env" } else { "keyring" };
        let mut json = serde_json::json!({
            "source": source,
            "token_env": auth.token_env,
            "keyring_user": storage.user(),
            "stored": stored.is_some(),
            "expires_at": stored.as_ref().map(|t| t.expires_at.to_rfc3339()),
            "expired": stored.as_ref().map(Tokens::is_expired),
        });
        if let Some(result) = &verified {
            json["verified"] = serde_json::json!(result.is_ok());
            match result {
                Ok(name) => json["root_folder"] = serde_json::json!(name),
                Err(e) => json["error"] = serde_json::json!(e),
            }
        }
        fmt.print_json(&json);
    } else {
        if env_active {
            fmt.success(&format!("Using the token from ${}", auth.token_env));
        }
        match &stored {
            Some(tokens) if tokens.is_expired() => fmt.warn(&format!(
                "Stored token for '{}' expired at {}",
                storage.user(),
                tokens.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            Some(tokens) => fmt.success(&format!(
                "Token stored for '{}', valid until {}",
                storage.user(),
                tokens.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None if env_active => {}
            None => fmt.warn(&format!(
                "No token stored for '{}'. Run 'cloudmirror auth set-token <TOKEN>'.",
                storage.user()
            )),
        }
        match &verified {
            Some(Ok(name)) => fmt.success(&format!("Root folder reachable: {name}")),
            Some(Err(e)) => fmt.error(&format!("Root folder check failed: {e}")),
            None => {}
        }
    }

    if let Some(Err(e)) = verified {
        anyhow::bail!("token check failed: {e}");
    }
    Ok(())
}

fn execute_logout(auth: &AuthConfig, fmt: &dyn OutputFormatter, format: OutputFormat) -> Result<()> {
    let storage = KeyringTokenStorage::new(auth.keyring_user.clone());
    storage
        .clear()
        .with_context(|| format!("Failed to remove token for '{}'", storage.user()))?;

    if format.is_json() {
        fmt.print_json(&serde_json::json!({ "success": true, "user": storage.user() }));
    } else {
        fmt.success(&format!("Removed stored token for '{}'", storage.user()));
    }
    Ok(())
}
