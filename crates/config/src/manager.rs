//! Configuration manager
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults ([`Settings::default`])
//! 2. an optional TOML file (`model-lifecycle.toml` unless a path is given)
//! 3. `MODEL_LIFECYCLE__<SECTION>__<KEY>` environment variables
//! 4. the standard hub variables (see [`crate::environment`])

use std::path::Path;

use config::{Config, Environment, File};
use tracing::debug;

use common::error::{Error, Result};

use crate::environment::HubEnvironment;
use crate::settings::Settings;

/// Default configuration file stem, resolved against the working directory
pub const DEFAULT_CONFIG_FILE: &str = "model-lifecycle";

/// Prefix of workspace-specific environment variables
pub const ENV_PREFIX: &str = "MODEL_LIFECYCLE";

/// Loads and holds the resolved settings
#[derive(Debug, Clone)]
pub struct ConfigManager {
    settings: Settings,
}

impl ConfigManager {
    /// Loads settings from the default file and the process environment
    pub fn new() -> Result<Self> {
        Self::load(None, |key| std::env::var(key).ok(), true)
    }

    /// Loads settings from `path` and the process environment
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load(Some(path), |key| std::env::var(key).ok(), true)
    }

    /// Wraps already-resolved settings
    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    pub(crate) fn load(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
        use_process_env: bool,
    ) -> Result<Self> {
        let defaults = Config::try_from(&Settings::default()).map_err(config_error)?;

        let mut builder = Config::builder().add_source(defaults);

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        if use_process_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let hub_env = HubEnvironment::read(lookup);
        builder = builder
            .set_override_option(
                "storage.cache_dir",
                hub_env.cache_dir.map(|p| p.to_string_lossy().into_owned()),
            )
            .and_then(|b| b.set_override_option("hub.endpoint", hub_env.endpoint))
            .and_then(|b| b.set_override_option("hub.token", hub_env.token))
            .and_then(|b| b.set_override_option("hub.offline", hub_env.offline))
            .map_err(config_error)?;

        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;

        debug!(
            "Resolved configuration: cache_dir={:?}, endpoint={}, offline={}",
            settings.storage.cache_dir, settings.hub.endpoint, settings.hub.offline
        );

        Ok(Self { settings })
    }

    /// Gets the resolved settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Consumes the manager, returning the settings
    pub fn into_settings(self) -> Settings {
        self.settings
    }
}

fn config_error(e: config::ConfigError) -> Error {
    Error::Config(e.to_string())
}
