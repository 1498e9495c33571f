//! Configuration management for the model lifecycle manager
//!
//! This crate resolves [`Settings`] from defaults, an optional TOML file and
//! the environment.

pub mod environment;
pub mod manager;
pub mod settings;

// Re-export commonly used types
pub use manager::ConfigManager;
pub use settings::{HubSettings, LogFormat, LoggingSettings, Settings, StorageSettings};
