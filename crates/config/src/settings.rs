//! Typed settings and their defaults

use std::path::PathBuf;

use hf_hub::Cache;
use serde::{Deserialize, Serialize};

/// Default remote model registry
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local artifact cache
    pub storage: StorageSettings,
    /// Remote registry client
    pub hub: HubSettings,
    /// Log output
    pub logging: LoggingSettings,
}

/// Local artifact cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root of the hub-style cache
    pub cache_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
        }
    }
}

/// Remote registry client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Base URL of the registry
    pub endpoint: String,
    /// Bearer token for gated or private repositories
    pub token: Option<String>,
    /// User agent sent with every request
    pub user_agent: String,
    /// Whole-request timeout
    pub timeout_secs: u64,
    /// Connect timeout
    pub connect_timeout_secs: u64,
    /// Never contact the registry
    pub offline: bool,
    /// Check sha256 digests published by the registry
    pub verify_checksums: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            token: None,
            user_agent: format!("model-lifecycle/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 3600,
            connect_timeout_secs: 30,
            offline: false,
            verify_checksums: true,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Also write daily-rotated log files here
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
        }
    }
}

/// The hub's default cache, `~/.cache/huggingface/hub`
///
/// Without a home directory the cache lives under the working directory.
pub fn default_cache_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(_) => Cache::default().path().clone(),
        None => PathBuf::from(".cache").join("huggingface").join("hub"),
    }
}
