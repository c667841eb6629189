//! Bootstrap configuration loading and config file resolution
//!
//! Settings sources priority (highest first):
//! 1. Command-line arguments (handled by each binary)
//! 2. Environment variables (handled by each binary)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is never fatal: a warning is logged and the built-in
//! defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Interface the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    #[serde(default)]
    pub reference: ReferenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            provider: ProviderConfig::default(),
            transport: TransportConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            reference: ReferenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which provider contract the gateway speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Suno-compatible box API (`/api/v1/generate`, `/api/v1/status`)
    #[default]
    Apibox,
    /// AIML audio generation API (`/v2/generate/audio`)
    Aiml,
}

/// External generation provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Base URL, without trailing slash
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Bearer token; `GCR_PROVIDER_API_KEY` takes precedence
    #[serde(default)]
    pub api_key: Option<String>,

    /// URL the provider posts webhook deliveries to
    #[serde(default = "default_callback_url")]
    pub callback_url: String,

    /// Default model identifier sent with generation requests
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: default_provider_base_url(),
            api_key: None,
            callback_url: default_callback_url(),
            model: default_model(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Retrying transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts (no backoff growth)
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// Attempts per status check; a failed check is retried by the next poll
    #[serde(default = "default_status_max_retries")]
    pub status_max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            status_max_retries: default_status_max_retries(),
        }
    }
}

/// Reconciliation waiter and extractor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Deadline for callers that wait for completion
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: u64,

    /// Deadline for callers that want a fast response and retrieve later
    #[serde(default = "default_sync_deadline_seconds")]
    pub sync_deadline_seconds: u64,

    /// Upper bound on a caller-supplied `timeout_seconds`
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,

    #[serde(default = "default_max_payload_depth")]
    pub max_payload_depth: usize,

    #[serde(default = "default_max_payload_nodes")]
    pub max_payload_nodes: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            deadline_seconds: default_deadline_seconds(),
            sync_deadline_seconds: default_sync_deadline_seconds(),
            max_timeout_seconds: default_max_timeout_seconds(),
            max_payload_depth: default_max_payload_depth(),
            max_payload_nodes: default_max_payload_nodes(),
        }
    }
}

impl ReconciliationConfig {
    /// Reject settings that would make the waiter spin or never wait
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(Error::Config(
                "reconciliation.poll_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.deadline_seconds == 0 || self.sync_deadline_seconds == 0 || self.max_timeout_seconds == 0 {
            return Err(Error::Config(
                "reconciliation deadlines must be greater than 0".to_string(),
            ));
        }
        if self.max_payload_depth == 0 || self.max_payload_nodes == 0 {
            return Err(Error::Config(
                "reconciliation payload limits must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reference asset lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Returned whenever a lookup fails or no lookup backend is configured
    #[serde(default = "default_reference_url")]
    pub default_url: String,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            default_url: default_reference_url(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_provider_base_url() -> String {
    "https://apibox.erweima.ai".to_string()
}

fn default_callback_url() -> String {
    "http://localhost:5001/callback".to_string()
}

fn default_model() -> String {
    "v4".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    5
}

fn default_status_max_retries() -> u32 {
    1
}

fn default_poll_interval_seconds() -> u64 {
    5
}

fn default_deadline_seconds() -> u64 {
    300
}

fn default_sync_deadline_seconds() -> u64 {
    10
}

fn default_max_timeout_seconds() -> u64 {
    3600
}

fn default_max_payload_depth() -> usize {
    64
}

fn default_max_payload_nodes() -> usize {
    10_000
}

fn default_reference_url() -> String {
    "https://tand-dev.github.io/audio-hosting/spinning-head-271171.mp3".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve the TOML config file for a module
///
/// Priority: explicit path → `~/.config/gcr/<module>.toml` → `/etc/gcr/<module>.toml`.
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(explicit: Option<&Path>, module_name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let file_name = format!("{}.toml", module_name);

    let user_config = dirs::config_dir().map(|d| d.join("gcr").join(&file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/gcr").join(&file_name);
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load bootstrap configuration, falling back to defaults when the file is missing
///
/// A file that exists but does not parse is an error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        warn!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using built-in defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    config.reconciliation.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Non-empty, non-whitespace check for secrets read from env or TOML
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
