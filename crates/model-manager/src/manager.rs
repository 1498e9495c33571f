//! Lifecycle manager
//!
//! Composes the local store, the download resolver and the registry into
//! the four lifecycle operations.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use common::error::{Error, Result};
use common::models::ModelId;
use common::types::{PullOptions, PullOutcome};
use common::utils::{format_duration, measure_execution_time_async};
use storage_adapter::LocalArtifactStore;

use crate::loader::ModelLoader;
use crate::registry::ModelRegistry;
use crate::resolver::DownloadResolver;

type PullLocks = DashMap<ModelId, Arc<tokio::sync::Mutex<()>>>;

/// A pull's share of the per-identifier lock
///
/// Dropping the last share removes the lock entry, also when the pull
/// future is cancelled.
struct PullSlot<'a> {
    locks: &'a PullLocks,
    id: &'a ModelId,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> PullSlot<'a> {
    fn acquire(locks: &'a PullLocks, id: &'a ModelId) -> Self {
        let lock = locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        Self { locks, id, lock }
    }
}

impl Drop for PullSlot<'_> {
    fn drop(&mut self) {
        // Two references left: the map's and this slot's.
        self.locks
            .remove_if(self.id, |_, lock| Arc::strong_count(lock) == 2);
    }
}

/// Entry point for pulling, loading and unloading models
pub struct ModelManager<L: ModelLoader> {
    /// Local artifact store
    store: LocalArtifactStore,

    /// Download strategy resolver
    resolver: DownloadResolver,

    /// Shared registry of loaded models
    registry: Arc<ModelRegistry<L>>,

    /// One lock per identifier with a pull in flight
    pull_locks: PullLocks,

    /// Refuse network access
    offline: bool,
}

impl<L: ModelLoader> ModelManager<L> {
    /// Creates a new manager
    pub fn new(store: LocalArtifactStore, resolver: DownloadResolver, registry: Arc<ModelRegistry<L>>) -> Self {
        Self {
            store,
            resolver,
            registry,
            pull_locks: DashMap::new(),
            offline: false,
        }
    }

    /// Disables or enables network access for pulls
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Local artifact store
    pub fn store(&self) -> &LocalArtifactStore {
        &self.store
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<ModelRegistry<L>> {
        &self.registry
    }

    /// Ensures `id` is present locally
    ///
    /// A present artifact is reported as `AlreadyExists` without touching the
    /// network. Concurrent pulls of one identifier run one at a time; pulls
    /// of different identifiers do not wait for each other.
    pub async fn pull(&self, id: &ModelId, options: &PullOptions) -> Result<PullOutcome> {
        if let Some(outcome) = self.existing(id) {
            debug!("Model {} already present, skipping download", id);
            return Ok(outcome);
        }

        if self.offline {
            return Err(Error::Offline(format!(
                "model {} is not present locally and network access is disabled",
                id
            )));
        }

        let slot = PullSlot::acquire(&self.pull_locks, id);
        let _pulling = slot.lock.lock().await;

        self.pull_locked(id, options).await
    }

    async fn pull_locked(&self, id: &ModelId, options: &PullOptions) -> Result<PullOutcome> {
        // Another pull may have finished while this one waited.
        if let Some(outcome) = self.existing(id) {
            return Ok(outcome);
        }

        info!("Pulling model {}", id);

        let (result, elapsed) = measure_execution_time_async(self.resolver.acquire(id, options)).await;

        match result {
            Ok(report) => {
                info!(
                    "Pulled model {} at revision {}: {} file(s), {} bytes in {}",
                    id,
                    report.revision,
                    report.files,
                    report.bytes,
                    format_duration(elapsed)
                );
                Ok(PullOutcome::Created {
                    path: report.path,
                    files: report.files,
                    bytes: report.bytes,
                })
            }
            Err(e) => {
                warn!("Failed to pull model {}: {}", id, e);
                Err(e)
            }
        }
    }

    fn existing(&self, id: &ModelId) -> Option<PullOutcome> {
        if !self.store.exists(id) {
            return None;
        }
        self.store
            .current_snapshot(id)
            .map(|path| PullOutcome::AlreadyExists { path })
    }

    /// Loads `id` into memory; never downloads
    pub async fn load(&self, id: &ModelId) -> Result<Arc<L::Model>> {
        self.registry.load(id).await
    }

    /// Releases a loaded model
    pub fn unload(&self, id: &ModelId) -> Result<()> {
        self.registry.unload(id)
    }

    /// Identifiers of loaded models
    pub fn list_loaded(&self) -> BTreeSet<ModelId> {
        self.registry.list_loaded()
    }

    /// Identifiers of artifacts present in the local store
    pub fn list_local(&self) -> Result<Vec<ModelId>> {
        self.store.list_local()
    }
}
