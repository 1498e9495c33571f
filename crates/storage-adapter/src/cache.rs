//! Hub-style local artifact cache
//!
//! ```text
//! <root>/models--<org>--<name>/
//!     refs/main                 revision of the current snapshot
//!     snapshots/<revision>/...  files, relative paths preserved
//! ```
//!
//! Folder naming and ref writes go through [`hf_hub::Cache`], so the cache
//! is shared with other hub clients on the host. `refs/main` is written
//! last, after every file of a pull has landed, so a model only counts as
//! present once a pull has completed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hf_hub::{Cache, Repo};
use tracing::{debug, warn};
use walkdir::WalkDir;

use common::error::{Error, Result};
use common::models::ModelId;

/// Suffix of files that are still being transferred
pub const INCOMPLETE_SUFFIX: &str = ".incomplete";

/// Name of the ref tracking the current snapshot
pub const DEFAULT_REF: &str = "main";

/// Folder prefix of model repositories inside the cache
const MODEL_FOLDER_PREFIX: &str = "models--";

/// A completed file inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Path relative to the snapshot directory
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// Read-mostly view of the local artifact cache
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    cache: Cache,
}

impl LocalArtifactStore {
    /// Creates a store rooted at `root`; the directory need not exist yet
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_cache(Cache::new(root.into()))
    }

    /// Creates a store over an existing hub cache
    pub fn from_cache(cache: Cache) -> Self {
        Self { cache }
    }

    /// Cache root
    pub fn root(&self) -> &Path {
        self.cache.path()
    }

    /// Directory holding every snapshot of `id`
    pub fn model_dir(&self, id: &ModelId) -> PathBuf {
        self.root().join(Repo::model(id.to_string()).folder_name())
    }

    /// Path of the ref file for `id`
    pub fn ref_path(&self, id: &ModelId) -> PathBuf {
        self.model_dir(id).join("refs").join(DEFAULT_REF)
    }

    /// Directory of one snapshot of `id`
    pub fn snapshot_dir(&self, id: &ModelId, revision: &str) -> PathBuf {
        self.model_dir(id).join("snapshots").join(revision)
    }

    /// Path of `file` in the current snapshot of `id`, if it is there
    pub fn file(&self, id: &ModelId, file: &str) -> Option<PathBuf> {
        self.cache.model(id.to_string()).get(file)
    }

    /// Revision recorded in the ref file, if any
    pub fn current_revision(&self, id: &ModelId) -> Option<String> {
        let revision = fs::read_to_string(self.ref_path(id)).ok()?;
        let revision = revision.trim();
        if validate_revision(revision).is_err() {
            warn!("Ignoring malformed ref for model {}: {:?}", id, revision);
            return None;
        }
        Some(revision.to_string())
    }

    /// Snapshot directory the ref points at, if it exists
    pub fn current_snapshot(&self, id: &ModelId) -> Option<PathBuf> {
        let revision = self.current_revision(id)?;
        let dir = self.snapshot_dir(id, &revision);
        dir.is_dir().then_some(dir)
    }

    /// Does `id` exist locally with at least one completed file?
    pub fn exists(&self, id: &ModelId) -> bool {
        match self.current_snapshot(id) {
            Some(dir) => completed_files(&dir).next().is_some(),
            None => false,
        }
    }

    /// Completed files of the current snapshot, sorted by path
    pub fn snapshot_files(&self, id: &ModelId) -> Result<Vec<LocalFile>> {
        let dir = self
            .current_snapshot(id)
            .ok_or_else(|| Error::NotFound(format!("Model {} is not present locally", id)))?;

        let mut files = Vec::new();
        for entry in completed_files(&dir) {
            let size = entry.metadata().map_err(io::Error::from)?.len();
            let path = entry
                .path()
                .strip_prefix(&dir)
                .map_err(|e| Error::Internal(e.to_string()))?
                .to_path_buf();
            files.push(LocalFile { path, size });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(files)
    }

    /// Points the ref of `id` at `revision`
    pub fn commit_snapshot(&self, id: &ModelId, revision: &str) -> Result<()> {
        validate_revision(revision)?;

        // Start from an empty ref so a shorter revision never keeps a tail
        // of the previous one.
        match fs::remove_file(self.ref_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.cache.model(id.to_string()).create_ref(revision)?;

        debug!("Committed snapshot {} for model {}", revision, id);

        Ok(())
    }

    /// Every model present locally, sorted
    pub fn list_local(&self) -> Result<Vec<ModelId>> {
        let entries = match fs::read_dir(self.root()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut models = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(id) = model_id_from_folder(&name) {
                if self.exists(&id) {
                    models.push(id);
                }
            }
        }
        models.sort();

        Ok(models)
    }
}

/// Identifier whose cache folder is `name`
///
/// Only folders that map back to the exact same name are accepted.
fn model_id_from_folder(name: &str) -> Option<ModelId> {
    let rest = name.strip_prefix(MODEL_FOLDER_PREFIX)?;
    let id = ModelId::new(rest.replacen("--", "/", 1)).ok()?;
    (Repo::model(id.to_string()).folder_name() == name).then_some(id)
}

fn validate_revision(revision: &str) -> Result<()> {
    if revision.is_empty()
        || revision == "."
        || revision == ".."
        || revision.contains(['/', '\\'])
        || revision.chars().any(char::is_whitespace)
    {
        return Err(Error::InvalidArgument(format!(
            "invalid snapshot revision: {:?}",
            revision
        )));
    }
    Ok(())
}

fn completed_files(dir: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            !entry
                .file_name()
                .to_string_lossy()
                .ends_with(INCOMPLETE_SUFFIX)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModelId {
        ModelId::new(s).unwrap()
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_layout() {
        let store = LocalArtifactStore::new("/cache");
        let model = id("org/name");
        assert_eq!(store.model_dir(&model), PathBuf::from("/cache/models--org--name"));
        assert_eq!(
            store.ref_path(&model),
            PathBuf::from("/cache/models--org--name/refs/main")
        );
        assert_eq!(
            store.snapshot_dir(&model, "abc123"),
            PathBuf::from("/cache/models--org--name/snapshots/abc123")
        );
    }

    #[test]
    fn test_exists_requires_committed_ref() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let model = id("org/name");

        assert!(!store.exists(&model));

        let snapshot = store.snapshot_dir(&model, "abc123");
        write(&snapshot.join("model.onnx"), "weights");
        assert!(!store.exists(&model), "files without a ref are a partial pull");

        store.commit_snapshot(&model, "abc123").unwrap();
        assert!(store.exists(&model));
        assert_eq!(store.current_snapshot(&model), Some(snapshot));
    }

    #[test]
    fn test_incomplete_files_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let model = id("org/name");

        let snapshot = store.snapshot_dir(&model, "main");
        write(&snapshot.join("model.onnx.incomplete"), "partial");
        store.commit_snapshot(&model, "main").unwrap();
        assert!(!store.exists(&model));

        write(&snapshot.join("nested/config.json"), "{}");
        assert!(store.exists(&model));

        let files = store.snapshot_files(&model).unwrap();
        assert_eq!(
            files,
            vec![LocalFile {
                path: PathBuf::from("nested/config.json"),
                size: 2
            }]
        );
    }

    #[test]
    fn test_snapshot_files_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        assert!(store.snapshot_files(&id("org/absent")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_local() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        assert!(store.list_local().unwrap().is_empty());

        for name in ["org/b", "org/a"] {
            let model = id(name);
            write(&store.snapshot_dir(&model, "r1").join("f.bin"), "x");
            store.commit_snapshot(&model, "r1").unwrap();
        }
        fs::create_dir_all(dir.path().join("models--org--partial/snapshots/r1")).unwrap();
        fs::create_dir_all(dir.path().join("datasets--org--data")).unwrap();

        assert_eq!(store.list_local().unwrap(), vec![id("org/a"), id("org/b")]);
    }

    #[test]
    fn test_file_resolves_through_current_ref() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let model = id("org/name");

        write(&store.snapshot_dir(&model, "old-revision").join("model.onnx"), "old");
        store.commit_snapshot(&model, "old-revision").unwrap();
        write(&store.snapshot_dir(&model, "r2").join("model.onnx"), "new");
        store.commit_snapshot(&model, "r2").unwrap();

        assert_eq!(store.current_revision(&model).as_deref(), Some("r2"));
        assert_eq!(
            store.file(&model, "model.onnx"),
            Some(store.snapshot_dir(&model, "r2").join("model.onnx"))
        );
        assert_eq!(store.file(&model, "missing.bin"), None);
    }

    #[test]
    fn test_model_id_from_folder() {
        assert_eq!(model_id_from_folder("models--org--name"), Some(id("org/name")));
        assert_eq!(model_id_from_folder("models--gpt2"), Some(id("gpt2")));
        assert_eq!(model_id_from_folder("models--org--a--b"), None);
        assert_eq!(model_id_from_folder("datasets--org--name"), None);
    }

    #[test]
    fn test_commit_rejects_bad_revision() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        for revision in ["", "..", "a/b", "a b"] {
            assert!(store.commit_snapshot(&id("org/name"), revision).is_err());
        }
    }
}
