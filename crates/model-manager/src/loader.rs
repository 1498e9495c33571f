//! Model initialization
//!
//! The registry does not know how a model becomes usable; it delegates that
//! to a [`ModelLoader`]. [`ArtifactLoader`] is the default: it brings a
//! locally present snapshot into a [`LoadedArtifact`] and never downloads.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use common::error::{Error, Result};
use common::models::ModelId;
use storage_adapter::{LocalArtifactStore, LocalFile};

/// Turns an identifier into an in-memory model
#[async_trait]
pub trait ModelLoader: Send + Sync + 'static {
    /// Handle stored in the registry once loading succeeds
    type Model: Send + Sync + 'static;

    /// Initializes the model; may be slow
    async fn load(&self, id: &ModelId) -> Result<Self::Model>;
}

/// A snapshot resident in memory
#[derive(Debug, Clone, Serialize)]
pub struct LoadedArtifact {
    /// Model ID
    pub id: ModelId,

    /// Snapshot directory the model was loaded from
    pub root: PathBuf,

    /// Files of the snapshot
    #[serde(skip)]
    pub files: Vec<LocalFile>,

    /// Total size of the files in bytes
    pub total_bytes: u64,

    /// Load timestamp
    pub loaded_at: DateTime<Utc>,
}

/// Loads artifacts from the local store
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    store: LocalArtifactStore,
}

impl ArtifactLoader {
    /// Creates a new artifact loader
    pub fn new(store: LocalArtifactStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ModelLoader for ArtifactLoader {
    type Model = LoadedArtifact;

    async fn load(&self, id: &ModelId) -> Result<LoadedArtifact> {
        let store = self.store.clone();
        let id = id.clone();

        // Directory walks block; keep them off the async workers.
        tokio::task::spawn_blocking(move || {
            let root = store
                .current_snapshot(&id)
                .ok_or_else(|| Error::NotFound(format!("Model {} is not present locally; pull it first", id)))?;
            let files = store.snapshot_files(&id)?;

            if files.is_empty() {
                return Err(Error::NotFound(format!("Model {} has no completed files", id)));
            }

            let total_bytes = files.iter().map(|f| f.size).sum();
            debug!("Read {} file(s) of model {} from {:?}", files.len(), id, root);

            Ok(LoadedArtifact {
                id,
                root,
                files,
                total_bytes,
                loaded_at: Utc::now(),
            })
        })
        .await
        .map_err(|e| Error::ModelLoad(format!("loader task failed: {}", e)))?
    }
}
