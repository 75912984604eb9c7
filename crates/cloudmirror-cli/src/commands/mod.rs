//! CLI subcommands
//!
//! Each command is a clap `Args`/`Subcommand` type with an async
//! `execute(format, config_path)` entry point. Helpers shared by several
//! commands live here.

pub mod auth;
pub mod config;
pub mod ls;
pub mod pull;
pub mod push;
pub mod status;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};

use cloudmirror_core::config::Config;

/// Load the config file and reject it when validation fails
///
/// Commands that talk to the remote store or the state database need a
/// complete configuration, unlike `config show`.
pub(crate) fn load_validated(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!(
            "No configuration at {}. Run 'cloudmirror config init' first.",
            path.display()
        );
    }
    let config =
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?;

    let errors = config.validate();
    if !errors.is_empty() {
        let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration:\n  {}", listed.join("\n  "));
    }
    Ok(config)
}

/// Load the config file when present, defaults otherwise, without validating
///
/// `push` and `ls` only need the mount path.
pub(crate) fn load_lenient(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
    } else {
        Ok(Config::default())
    }
}
