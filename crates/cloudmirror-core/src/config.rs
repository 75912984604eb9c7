//! Configuration module for cloudmirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, FolderId};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for cloudmirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

/// What to mirror and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory whose tree is mirrored.
    pub mount_path: PathBuf,
    /// Remote folder that mirrors `mount_path`. Required.
    pub remote_root_folder_id: String,
    /// Seconds between the end of one cycle and the start of the next.
    pub scan_interval_secs: u64,
    /// Top-level directories to mirror. Empty means the whole tree.
    pub subdirectories: Vec<String>,
    /// Glob patterns matched against file names; matches are never synced.
    pub exclude: Vec<String>,
    /// Reuse remote folders and files that already carry the expected name.
    pub adopt_existing: bool,
    /// Reuse a fingerprint while a file's size and mtime are unchanged.
    pub trust_mtime: bool,
    /// Start a cycle early when the filesystem watcher reports changes.
    pub watch: bool,
    /// Quiet period, in milliseconds, before watcher changes trigger a cycle.
    pub debounce_ms: u64,
}

/// Remote store endpoints and call policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Metadata API base URL.
    pub api_base_url: String,
    /// Content upload API base URL.
    pub upload_base_url: String,
    /// Timeout applied to every remote call, in seconds.
    pub call_timeout_secs: u64,
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// First backoff delay in milliseconds; doubled on each retry.
    pub retry_base_delay_ms: u64,
    /// Files larger than this are uploaded through a resumable session.
    pub resumable_threshold_bytes: u64,
    /// Bytes sent per request in a resumable session; a multiple of 256 KiB.
    pub upload_chunk_bytes: u64,
}

/// Location of the sync state database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub database_path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `human` or `json`.
    pub format: String,
}

/// Where the access token comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Keyring entry holding the stored tokens.
    pub keyring_user: String,
    /// Environment variable that, when set, overrides the keyring.
    pub token_env: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/cloudmirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cloudmirror")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mount_path: PathBuf::from("/tmp/myfs_mount"),
            remote_root_folder_id: String::new(),
            scan_interval_secs: 5,
            subdirectories: Vec::new(),
            exclude: Vec::new(),
            adopt_existing: true,
            trust_mtime: false,
            watch: false,
            debounce_ms: 500,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base_url: "https://www.googleapis.com/upload/drive/v3".to_string(),
            call_timeout_secs: 60,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            resumable_threshold_bytes: 5 * 1024 * 1024,
            upload_chunk_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("cloudmirror")
                .join("state.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "human".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            keyring_user: "default".to_string(),
            token_env: "CLOUDMIRROR_ACCESS_TOKEN".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed accessors
// ---------------------------------------------------------------------------

impl SyncConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The configured root folder as a validated identifier.
    pub fn root_folder_id(&self) -> Result<FolderId, DomainError> {
        FolderId::new(self.remote_root_folder_id.clone())
    }
}

impl RemoteConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn transfer_limits(&self) -> TransferLimits {
        TransferLimits {
            resumable_threshold: self.resumable_threshold_bytes,
            chunk_size: self.upload_chunk_bytes,
        }
    }
}

/// Resumable upload chunks must be a multiple of this many bytes.
pub const UPLOAD_CHUNK_ALIGNMENT: u64 = 256 * 1024;

/// When an upload switches to a resumable session, and how it is split.
///
/// Shared by the scanner (which keeps large files on disk), the remote
/// client (which sends them in chunks) and the engine (which sizes the
/// deadline of the whole transfer from the number of requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub resumable_threshold: u64,
    pub chunk_size: u64,
}

impl TransferLimits {
    pub fn is_resumable(&self, len: u64) -> bool {
        len > self.resumable_threshold
    }

    /// HTTP requests needed to upload `len` bytes: one for a simple upload,
    /// or the session request plus one per chunk.
    pub fn requests_for(&self, len: u64) -> u64 {
        if !self.is_resumable(len) {
            return 1;
        }
        let chunk = self.chunk_size.max(1);
        1 + len.div_ceil(chunk)
    }
}

impl Default for TransferLimits {
    fn default() -> Self {
        RemoteConfig::default().transfer_limits()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.scan_interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
pub const VALID_LOG_FORMATS: &[&str] = &["human", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if !self.sync.mount_path.is_absolute() {
            errors.push(ValidationError {
                field: "sync.mount_path".into(),
                message: format!(
                    "must be an absolute path: {}",
                    self.sync.mount_path.display()
                ),
            });
        }
        if self.sync.remote_root_folder_id.is_empty() {
            errors.push(ValidationError {
                field: "sync.remote_root_folder_id".into(),
                message: "must be set".into(),
            });
        } else if let Err(e) = self.sync.root_folder_id() {
            errors.push(ValidationError {
                field: "sync.remote_root_folder_id".into(),
                message: e.to_string(),
            });
        }
        if self.sync.scan_interval_secs == 0 {
            errors.push(ValidationError {
                field: "sync.scan_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.debounce_ms == 0 {
            errors.push(ValidationError {
                field: "sync.debounce_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        for dir in &self.sync.subdirectories {
            if dir.is_empty() || dir.contains('/') || dir == "." || dir == ".." {
                errors.push(ValidationError {
                    field: "sync.subdirectories".into(),
                    message: format!("'{dir}' is not a single directory name"),
                });
            }
        }
        for pattern in &self.sync.exclude {
            if let Err(e) = glob::Pattern::new(pattern) {
                errors.push(ValidationError {
                    field: "sync.exclude".into(),
                    message: format!("invalid pattern '{pattern}': {e}"),
                });
            }
        }

        // --- remote ---
        if self.remote.call_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.call_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.remote.upload_chunk_bytes == 0
            || self.remote.upload_chunk_bytes % UPLOAD_CHUNK_ALIGNMENT != 0
        {
            errors.push(ValidationError {
                field: "remote.upload_chunk_bytes".into(),
                message: format!(
                    "must be a positive multiple of {UPLOAD_CHUNK_ALIGNMENT}, got {}",
                    self.remote.upload_chunk_bytes
                ),
            });
        }
        for (field, url) in [
            ("remote.api_base_url", &self.remote.api_base_url),
            ("remote.upload_base_url", &self.remote.upload_base_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must be an http(s) URL: '{url}'"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        // --- auth ---
        if self.auth.keyring_user.is_empty() {
            errors.push(ValidationError {
                field: "auth.keyring_user".into(),
                message: "must not be empty".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use cloudmirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .mount_path(PathBuf::from("/srv/mount"))
///     .remote_root_folder_id("0AbCdEf")
///     .scan_interval_secs(30)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn mount_path(mut self, path: PathBuf) -> Self {
        self.config.sync.mount_path = path;
        self
    }

    pub fn remote_root_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.sync.remote_root_folder_id = id.into();
        self
    }

    pub fn scan_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.scan_interval_secs = seconds;
        self
    }

    pub fn subdirectory(mut self, dir: impl Into<String>) -> Self {
        self.config.sync.subdirectories.push(dir.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.config.sync.exclude.push(pattern.into());
        self
    }

    pub fn adopt_existing(mut self, adopt: bool) -> Self {
        self.config.sync.adopt_existing = adopt;
        self
    }

    pub fn trust_mtime(mut self, trust: bool) -> Self {
        self.config.sync.trust_mtime = trust;
        self
    }

    pub fn watch(mut self, watch: bool) -> Self {
        self.config.sync.watch = watch;
        self
    }

    // --- remote ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.api_base_url = url.into();
        self
    }

    pub fn upload_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.upload_base_url = url.into();
        self
    }

    pub fn call_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.call_timeout_secs = seconds;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.remote.max_retries = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.remote.retry_base_delay_ms = ms;
        self
    }

    pub fn resumable_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.remote.resumable_threshold_bytes = bytes;
        self
    }

    pub fn upload_chunk_bytes(mut self, bytes: u64) -> Self {
        self.config.remote.upload_chunk_bytes = bytes;
        self
    }

    // --- state ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.state.database_path = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- auth ---

    pub fn keyring_user(mut self, user: impl Into<String>) -> Self {
        self.config.auth.keyring_user = user.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
