//! Main integration module for the model lifecycle manager
//!
//! This module wires the configuration, the local artifact store, the hub
//! client, the download resolver and the model registry into one
//! [`ModelLifecycle`] instance.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use lifecycle_config::Settings;
use model_manager::{ArtifactLoader, DownloadResolver, HubClient, ModelManager, ModelRegistry, RemoteRegistry};
use storage_adapter::LocalArtifactStore;

pub use common::{Error, ModelId, PullOptions, PullOutcome};
pub use model_manager::LoadedArtifact;

/// Manager type used by the binary
pub type ArtifactManager = ModelManager<ArtifactLoader>;

/// Main model lifecycle service
pub struct ModelLifecycle {
    /// Resolved settings
    settings: Settings,

    /// Model manager
    model_manager: Arc<ArtifactManager>,
}

impl ModelLifecycle {
    /// Creates a lifecycle service talking to the configured hub
    pub fn new(settings: Settings) -> Result<Self> {
        let remote = Arc::new(HubClient::new(&settings.hub)?);
        Ok(Self::with_remote(settings, remote))
    }

    /// Creates a lifecycle service on top of an arbitrary remote registry
    pub fn with_remote(settings: Settings, remote: Arc<dyn RemoteRegistry>) -> Self {
        info!(
            "Initializing model lifecycle manager (cache: {:?}, offline: {})",
            settings.storage.cache_dir, settings.hub.offline
        );

        let store = LocalArtifactStore::new(&settings.storage.cache_dir);
        let resolver = DownloadResolver::new(remote, store.clone());
        let registry = Arc::new(ModelRegistry::new(ArtifactLoader::new(store.clone())));

        let model_manager =
            Arc::new(ModelManager::new(store, resolver, registry).with_offline(settings.hub.offline));

        Self {
            settings,
            model_manager,
        }
    }

    /// Gets the resolved settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Gets the model manager
    pub fn get_model_manager(&self) -> Arc<ArtifactManager> {
        self.model_manager.clone()
    }
}
