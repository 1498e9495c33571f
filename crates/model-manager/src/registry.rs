//! Registry of resident models
//!
//! One table maps each identifier to either a `Loading` placeholder or a
//! `Loaded` handle. The table lock is held only while the table itself is
//! read or changed; model initialization runs without it, so a slow load
//! never blocks listing or loading other models.
//!
//! Per identifier the states move `Absent -> Loading -> Loaded -> Absent`,
//! or `Loading -> Absent` when initialization fails or is abandoned.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use common::error::{Error, Result};
use common::models::ModelId;
use common::utils::{format_duration, measure_execution_time_async};

use crate::loader::ModelLoader;

enum Slot<M> {
    Loading,
    Loaded(Arc<M>),
}

type Table<M> = Mutex<HashMap<ModelId, Slot<M>>>;

/// Removes the `Loading` placeholder unless the load was committed
///
/// This covers errors, panics in the loader and the load future being
/// dropped. A committed entry is never touched: residency outlives the
/// caller that performed the load.
struct LoadGuard<'a, M> {
    table: &'a Table<M>,
    id: ModelId,
    committed: bool,
}

impl<'a, M> LoadGuard<'a, M> {
    fn commit(mut self, model: Arc<M>) {
        self.table.lock().insert(self.id.clone(), Slot::Loaded(model));
        self.committed = true;
    }
}

impl<M> Drop for LoadGuard<'_, M> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut table = self.table.lock();
        if matches!(table.get(&self.id), Some(Slot::Loading)) {
            table.remove(&self.id);
            debug!("Discarded loading entry for model {}", self.id);
        }
    }
}

/// Registry of models resident in memory
pub struct ModelRegistry<L: ModelLoader> {
    /// Model initializer
    loader: L,

    /// Identifier -> loading placeholder or loaded handle
    table: Table<L::Model>,
}

impl<L: ModelLoader> ModelRegistry<L> {
    /// Creates an empty registry
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Loads `id` into memory
    ///
    /// Fails immediately with `AlreadyLoaded` if `id` is loaded or being
    /// loaded; it never waits for another caller's load. On success the
    /// model stays resident until [`ModelRegistry::unload`], whatever the
    /// caller does with the returned handle.
    pub async fn load(&self, id: &ModelId) -> Result<Arc<L::Model>> {
        let guard = self.begin_load(id)?;

        info!("Loading model {}", id);

        let (result, elapsed) = measure_execution_time_async(self.loader.load(id)).await;

        match result {
            Ok(model) => {
                let model = Arc::new(model);
                guard.commit(model.clone());
                info!("Model {} loaded in {}", id, format_duration(elapsed));
                Ok(model)
            }
            Err(e) => {
                warn!("Failed to load model {} after {}: {}", id, format_duration(elapsed), e);
                Err(e)
            }
        }
    }

    fn begin_load(&self, id: &ModelId) -> Result<LoadGuard<'_, L::Model>> {
        let mut table = self.table.lock();

        match table.entry(id.clone()) {
            Entry::Occupied(entry) => {
                let state = match entry.get() {
                    Slot::Loading => "being loaded",
                    Slot::Loaded(_) => "loaded",
                };
                Err(Error::AlreadyLoaded(format!("Model {} is already {}", id, state)))
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::Loading);
                Ok(LoadGuard {
                    table: &self.table,
                    id: id.clone(),
                    committed: false,
                })
            }
        }
    }

    /// Unloads `id`
    ///
    /// Fails with `NotFound` if `id` has no entry, and with `InUse` while it
    /// is still loading or while a handle obtained from [`ModelRegistry::get`]
    /// or [`ModelRegistry::load`] is alive.
    pub fn unload(&self, id: &ModelId) -> Result<()> {
        let removed = {
            let mut table = self.table.lock();

            match table.get(id) {
                None => {
                    return Err(Error::NotFound(format!("Model {} is not loaded", id)));
                }
                Some(Slot::Loading) => {
                    return Err(Error::InUse(format!("Model {} is still loading", id)));
                }
                Some(Slot::Loaded(model)) if Arc::strong_count(model) > 1 => {
                    return Err(Error::InUse(format!(
                        "Model {} is referenced by {} active user(s)",
                        id,
                        Arc::strong_count(model) - 1
                    )));
                }
                Some(Slot::Loaded(_)) => table.remove(id),
            }
        };

        // Release the model outside the lock.
        drop(removed);

        info!("Model {} unloaded", id);

        Ok(())
    }

    /// Identifiers of every loaded model; loads in flight are not included
    pub fn list_loaded(&self) -> BTreeSet<ModelId> {
        self.table
            .lock()
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Loaded(_) => Some(id.clone()),
                Slot::Loading => None,
            })
            .collect()
    }

    /// Handle of a loaded model
    ///
    /// Holding the handle blocks [`ModelRegistry::unload`].
    pub fn get(&self, id: &ModelId) -> Option<Arc<L::Model>> {
        match self.table.lock().get(id) {
            Some(Slot::Loaded(model)) => Some(model.clone()),
            _ => None,
        }
    }

    /// Checks if a model is loaded
    pub fn is_loaded(&self, id: &ModelId) -> bool {
        matches!(self.table.lock().get(id), Some(Slot::Loaded(_)))
    }

    /// Number of loaded models
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Loaded(_)))
            .count()
    }

    /// Returns true if no model is loaded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn has_entry(&self, id: &ModelId) -> bool {
        self.table.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::{Duration, Instant};
    use tokio::sync::Semaphore;

    #[derive(Debug)]
    struct FakeModel {
        id: ModelId,
    }

    /// Loader with configurable latency, failures and a start gate
    #[derive(Default)]
    struct FakeLoader {
        delay: Duration,
        failing: parking_lot::Mutex<HashSet<String>>,
        panicking: bool,
        gate: Option<Arc<Semaphore>>,
        ungated: HashSet<String>,
    }

    #[async_trait]
    impl ModelLoader for FakeLoader {
        type Model = FakeModel;

        async fn load(&self, id: &ModelId) -> Result<FakeModel> {
            if let Some(gate) = self.gate.as_ref().filter(|_| !self.ungated.contains(id.as_str())) {
                gate.acquire().await.expect("gate closed").forget();
            }
            tokio::time::sleep(self.delay).await;
            if self.panicking {
                panic!("simulated loader crash");
            }
            if self.failing.lock().contains(id.as_str()) {
                return Err(Error::ModelLoad(format!("simulated fault for {}", id)));
            }
            Ok(FakeModel { id: id.clone() })
        }
    }

    fn id(s: &str) -> ModelId {
        ModelId::new(s).unwrap()
    }

    async fn wait_for_entry<L: ModelLoader>(registry: &ModelRegistry<L>, model: &ModelId) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !registry.has_entry(model) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("load never started");
    }

    #[tokio::test]
    async fn test_load_then_load_again_conflicts() {
        let registry = ModelRegistry::new(FakeLoader::default());
        let model = id("org/modelA");

        let handle = registry.load(&model).await.unwrap();
        assert_eq!(handle.id, model);

        let err = registry.load(&model).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyLoaded(_)));
        assert_eq!(registry.list_loaded(), BTreeSet::from([model]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_of_same_id_race_safely() {
        for _ in 0..20 {
            let registry = Arc::new(ModelRegistry::new(FakeLoader {
                delay: Duration::from_millis(10),
                ..FakeLoader::default()
            }));
            let model = id("org/modelA");

            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let registry = registry.clone();
                    let model = model.clone();
                    tokio::spawn(async move { registry.load(&model).await.map(|_| ()) })
                })
                .collect();

            let mut created = 0;
            let mut conflicts = 0;
            for task in tasks {
                match task.await.unwrap() {
                    Ok(()) => created += 1,
                    Err(Error::AlreadyLoaded(_)) => conflicts += 1,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            assert_eq!((created, conflicts), (1, 1));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_loads_run_in_parallel() {
        let delay = Duration::from_millis(300);
        let registry = Arc::new(ModelRegistry::new(FakeLoader {
            delay,
            ..FakeLoader::default()
        }));

        let start = Instant::now();
        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.load(&id(&format!("org/model{i}"))).await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let elapsed = start.elapsed();

        assert!(elapsed < delay * 2, "loads serialized: {elapsed:?}");
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn test_unload_transitions() {
        let registry = ModelRegistry::new(FakeLoader::default());
        let model = id("org/modelA");

        assert!(registry.unload(&model).unwrap_err().is_not_found());

        drop(registry.load(&model).await.unwrap());
        registry.unload(&model).unwrap();

        assert!(registry.list_loaded().is_empty());
        assert!(registry.unload(&model).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unload_while_referenced_is_in_use() {
        let registry = ModelRegistry::new(FakeLoader::default());
        let model = id("org/modelA");

        let handle = registry.load(&model).await.unwrap();
        let err = registry.unload(&model).unwrap_err();
        assert!(matches!(err, Error::InUse(_)));

        drop(handle);
        let borrowed = registry.get(&model).unwrap();
        assert!(matches!(registry.unload(&model), Err(Error::InUse(_))));

        drop(borrowed);
        registry.unload(&model).unwrap();
        assert!(registry.get(&model).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_loading_entry_is_hidden_and_cannot_be_unloaded() {
        let gate = Arc::new(Semaphore::new(0));
        let registry = Arc::new(ModelRegistry::new(FakeLoader {
            gate: Some(gate.clone()),
            ungated: HashSet::from(["org/modelB".to_string()]),
            ..FakeLoader::default()
        }));
        let model = id("org/modelA");

        let task = {
            let registry = registry.clone();
            let model = model.clone();
            tokio::spawn(async move { registry.load(&model).await.map(|_| ()) })
        };
        wait_for_entry(&registry, &model).await;

        assert!(registry.list_loaded().is_empty());
        assert!(!registry.is_loaded(&model));
        assert!(registry.get(&model).is_none());
        assert!(matches!(registry.unload(&model), Err(Error::InUse(_))));
        assert!(matches!(registry.load(&model).await, Err(Error::AlreadyLoaded(_))));

        // Other identifiers load while the first one is still pending.
        let other = id("org/modelB");
        registry.load(&other).await.unwrap();
        assert_eq!(registry.list_loaded(), BTreeSet::from([other.clone()]));
        assert!(registry.has_entry(&model));

        gate.add_permits(1);
        task.await.unwrap().unwrap();
        assert_eq!(registry.list_loaded(), BTreeSet::from([model, other]));
    }

    #[tokio::test]
    async fn test_failed_load_leaves_no_entry() {
        let loader = FakeLoader::default();
        loader.failing.lock().insert("org/modelA".to_string());
        let registry = ModelRegistry::new(loader);
        let model = id("org/modelA");

        let err = registry.load(&model).await.unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(registry.list_loaded().is_empty());
        assert!(!registry.has_entry(&model));

        registry.loader.failing.lock().clear();
        registry.load(&model).await.unwrap();
        assert!(registry.is_loaded(&model));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_load_leaves_no_entry() {
        let gate = Arc::new(Semaphore::new(0));
        let registry = Arc::new(ModelRegistry::new(FakeLoader {
            gate: Some(gate),
            ..FakeLoader::default()
        }));
        let model = id("org/modelA");

        let task = {
            let registry = registry.clone();
            let model = model.clone();
            tokio::spawn(async move { registry.load(&model).await.map(|_| ()) })
        };
        wait_for_entry(&registry, &model).await;

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!registry.has_entry(&model));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_loader_leaves_no_entry() {
        let registry = Arc::new(ModelRegistry::new(FakeLoader {
            panicking: true,
            ..FakeLoader::default()
        }));
        let model = id("org/modelA");

        let result = {
            let registry = registry.clone();
            let model = model.clone();
            tokio::spawn(async move { registry.load(&model).await.map(|_| ()) }).await
        };

        assert!(result.unwrap_err().is_panic());
        assert!(!registry.has_entry(&model));
        assert!(registry.is_empty());
    }
}
