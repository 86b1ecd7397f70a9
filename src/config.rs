//! Configuration module for filedrop.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{FiledropError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timezone for displaying upload times on the listing page (e.g., "Asia/Tokyo", "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timezone: default_timezone(),
        }
    }
}

/// What happens when an upload targets a path that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Append `_1`, `_2`, ... before the extension until the name is free.
    #[serde(alias = "auto_rename")]
    Rename,
}

impl FromStr for ConflictPolicy {
    type Err = FiledropError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "rename" | "auto_rename" | "auto-rename" => Ok(ConflictPolicy::Rename),
            other => Err(FiledropError::Config(format!(
                "unknown conflict policy: {other}"
            ))),
        }
    }
}

/// Upload storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory under which all uploaded content lives.
    #[serde(default = "default_upload_root")]
    pub upload_root: String,
    /// Maximum request body size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Collision handling for uploads.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Name of the metadata backing file inside the upload root.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
}

fn default_upload_root() -> String {
    "uploads".to_string()
}

fn default_max_upload_size() -> u64 {
    1024
}

fn default_metadata_file() -> String {
    "metadata.json".to_string()
}

impl StorageConfig {
    /// Maximum request body size in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_size_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            max_upload_size_mb: default_max_upload_size(),
            conflict_policy: ConflictPolicy::default(),
            metadata_file: default_metadata_file(),
        }
    }
}

/// Rate limiting for mutating endpoints (upload, delete).
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Requests allowed per client within one window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Interval between sweeps of expired client windows.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Use X-Forwarded-For / X-Real-IP as the client key (only behind a trusted proxy).
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

impl RateLimitSettings {
    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            cleanup_interval_secs: default_cleanup_interval(),
            trust_proxy_headers: false,
        }
    }
}

/// Templates configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TemplatesConfig {
    /// Directory holding an `index.html` override. The built-in page is used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/filedrop.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Templates configuration.
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FiledropError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load_with_env`], but a missing file is `Ok(None)`.
    ///
    /// Any other read or parse failure is still an error.
    pub fn load_with_env_if_exists<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        match Self::load_with_env(path) {
            Ok(config) => Ok(Some(config)),
            Err(FiledropError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FiledropError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEDROP_UPLOAD_ROOT`
    /// - `FILEDROP_MAX_UPLOAD_MB`
    /// - `FILEDROP_RATE_LIMIT`
    /// - `FILEDROP_RATE_WINDOW_SECS`
    /// - `FILEDROP_HOST`
    /// - `FILEDROP_PORT`
    /// - `FILEDROP_LOG_LEVEL`
    ///
    /// Empty or unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(root) = env_string("FILEDROP_UPLOAD_ROOT") {
            self.storage.upload_root = root;
        }
        if let Some(mb) = env_parsed("FILEDROP_MAX_UPLOAD_MB") {
            self.storage.max_upload_size_mb = mb;
        }
        if let Some(limit) = env_parsed("FILEDROP_RATE_LIMIT") {
            self.rate_limit.max_requests = limit;
        }
        if let Some(secs) = env_parsed("FILEDROP_RATE_WINDOW_SECS") {
            self.rate_limit.window_secs = secs;
        }
        if let Some(host) = env_string("FILEDROP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parsed("FILEDROP_PORT") {
            self.server.port = port;
        }
        if let Some(level) = env_string("FILEDROP_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.upload_root.trim().is_empty() {
            return Err(FiledropError::Validation(
                "storage.upload_root must not be empty".to_string(),
            ));
        }
        if self.storage.max_upload_size_mb == 0 {
            return Err(FiledropError::Validation(
                "storage.max_upload_size_mb must be greater than 0".to_string(),
            ));
        }
        let meta = &self.storage.metadata_file;
        if meta.is_empty() || meta.contains('/') || meta.contains('\\') || meta == "." || meta == ".." {
            return Err(FiledropError::Validation(format!(
                "storage.metadata_file must be a plain file name, got {meta:?}"
            )));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(FiledropError::Validation(
                "rate_limit.max_requests must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(FiledropError::Validation(
                "rate_limit.window_secs must be greater than 0".to_string(),
            ));
        }
        if self.server.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(FiledropError::Validation(format!(
                "unknown timezone: {}",
                self.server.timezone
            )));
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}
