//! Config command - View and manage cloudmirror configuration
//!
//! Provides the `cloudmirror config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Writes a starter configuration file (`init`)
//! 3. Sets individual configuration values via dot-notation keys
//! 4. Validates the configuration file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use cloudmirror_core::config::{Config, ConfigBuilder};

use crate::output::{OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Write a starter configuration file
    Init {
        /// Local directory to mirror
        #[arg(long)]
        mount_path: PathBuf,
        /// Drive folder id that mirrors the mount root
        #[arg(long)]
        root_folder_id: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.scan_interval_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = format.formatter();
        match self {
            ConfigCommand::Show => execute_show(config_path, &*formatter, format),
            ConfigCommand::Init {
                mount_path,
                root_folder_id,
                force,
            } => execute_init(
                config_path,
                mount_path,
                root_folder_id,
                *force,
                &*formatter,
                format,
            ),
            ConfigCommand::Set { key, value } => {
                execute_set(config_path, key, value, &*formatter, format)
            }
            ConfigCommand::Validate => execute_validate(config_path, &*formatter, format),
        }
    }
}

fn execute_show(path: &Path, formatter: &dyn OutputFormatter, format: OutputFormat) -> Result<()> {
    let exists = path.exists();
    let config = if exists {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::default()
    };

    info!(config_path = %path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
        return Ok(());
    }

    if exists {
        formatter.success(&format!("Configuration ({})", path.display()));
    } else {
        formatter.warn(&format!("{} not found, showing defaults", path.display()));
    }
    formatter.info("");
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn execute_init(
    path: &Path,
    mount_path: &Path,
    root_folder_id: &str,
    force: bool,
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let config = init_config(mount_path, root_folder_id)?;
    config
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(config_path = %path.display(), "Wrote configuration");

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "config_path": path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Wrote {}", path.display()));
        if !mount_path.is_dir() {
            formatter.warn(&format!(
                "{} does not exist yet; cycles stay empty until it does",
                mount_path.display()
            ));
        }
    }
    Ok(())
}

/// Defaults plus the two required settings
fn init_config(mount_path: &Path, root_folder_id: &str) -> Result<Config> {
    ConfigBuilder::new()
        .mount_path(mount_path.to_path_buf())
        .remote_root_folder_id(root_folder_id)
        .build_validated()
        .map_err(|errors| {
            let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow::anyhow!("Invalid settings:\n  {}", listed.join("\n  "))
        })
}

fn execute_set(
    path: &Path,
    key: &str,
    value: &str,
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    let mut config = if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::default()
    };

    info!(key = %key, value = %value, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "error": e.to_string(),
            }));
        } else {
            formatter.error(&format!("Failed to set '{}': {}", key, e));
            formatter.info("");
            formatter.info("Supported keys:");
            for supported in SUPPORTED_KEYS {
                formatter.info(&format!("  {supported}"));
            }
        }
        anyhow::bail!("configuration unchanged");
    }

    // Only the edited field must be valid; other gaps are for `validate` to report
    let field_errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|e| e.field == key)
        .map(|e| e.message)
        .collect();
    if !field_errors.is_empty() {
        anyhow::bail!("Invalid value for '{}': {}", key, field_errors.join("; "));
    }

    config
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "value": value,
            "config_path": path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {} = {}", key, value));
        formatter.info(&format!("Saved to {}", path.display()));
    }
    Ok(())
}

fn execute_validate(
    path: &Path,
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    if !path.exists() {
        anyhow::bail!(
            "Configuration file not found at {}. Run 'cloudmirror config init'.",
            path.display()
        );
    }
    let config = Config::load(path)
        .with_context(|| format!("Failed to parse configuration {}", path.display()))?;

    info!(config_path = %path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("configuration is invalid")
    }
}

const SUPPORTED_KEYS: &[&str] = &[
    "sync.mount_path",
    "sync.remote_root_folder_id",
    "sync.scan_interval_secs",
    "sync.subdirectories         (comma-separated)",
    "sync.exclude                (comma-separated glob patterns)",
    "sync.adopt_existing         (true|false)",
    "sync.trust_mtime            (true|false)",
    "sync.watch                  (true|false)",
    "sync.debounce_ms",
    "remote.api_base_url",
    "remote.upload_base_url",
    "remote.call_timeout_secs",
    "remote.max_retries",
    "remote.retry_base_delay_ms",
    "state.database_path",
    "logging.level               (trace|debug|info|warn|error)",
    "logging.format              (human|json)",
    "auth.keyring_user",
    "auth.token_env",
];

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Expected a non-negative integer for {key}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => anyhow::bail!("Expected true or false for {key}"),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "sync.mount_path" => config.sync.mount_path = PathBuf::from(value),
        "sync.remote_root_folder_id" => config.sync.remote_root_folder_id = value.to_string(),
        "sync.scan_interval_secs" => config.sync.scan_interval_secs = parse_number(key, value)?,
        "sync.subdirectories" => config.sync.subdirectories = parse_list(value),
        "sync.exclude" => config.sync.exclude = parse_list(value),
        "sync.adopt_existing" => config.sync.adopt_existing = parse_bool(key, value)?,
        "sync.trust_mtime" => config.sync.trust_mtime = parse_bool(key, value)?,
        "sync.watch" => config.sync.watch = parse_bool(key, value)?,
        "sync.debounce_ms" => config.sync.debounce_ms = parse_number(key, value)?,

        "remote.api_base_url" => config.remote.api_base_url = value.to_string(),
        "remote.upload_base_url" => config.remote.upload_base_url = value.to_string(),
        "remote.call_timeout_secs" => config.remote.call_timeout_secs = parse_number(key, value)?,
        "remote.max_retries" => config.remote.max_retries = parse_number(key, value)?,
        "remote.retry_base_delay_ms" => {
            config.remote.retry_base_delay_ms = parse_number(key, value)?
        }

        "state.database_path" => config.state.database_path = PathBuf::from(value),

        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => config.logging.format = value.to_string(),

        "auth.keyring_user" => config.auth.keyring_user = value.to_string(),
        "auth.token_env" => config.auth.token_env = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }
    Ok(())
}
