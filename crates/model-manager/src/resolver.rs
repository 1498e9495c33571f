//! Download strategy resolution
//!
//! Reserved bundle identifiers get their dedicated routine; everything else
//! is fetched as a filtered snapshot of the remote repository. Files land in
//! the local store's snapshot directory and the snapshot ref is committed
//! only after every selected file has been written.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use common::error::{Error, Result};
use common::models::ModelId;
use common::types::PullOptions;
use storage_adapter::{LocalArtifactStore, DEFAULT_REF};

use crate::bundle::{BundleComponent, BundleKind};
use crate::filter::FileFilter;
use crate::hub::{RemoteFile, RemoteRegistry};

/// How an identifier is acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStrategy {
    /// Dedicated multi-asset routine
    Bundle(BundleKind),
    /// Filtered snapshot of the repository named by the identifier
    Snapshot,
}

impl DownloadStrategy {
    /// Picks the strategy for `id`
    pub fn resolve(id: &ModelId) -> Self {
        match BundleKind::from_model_id(id) {
            Some(kind) => DownloadStrategy::Bundle(kind),
            None => DownloadStrategy::Snapshot,
        }
    }
}

/// What a successful acquisition wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireReport {
    /// Committed snapshot revision
    pub revision: String,
    /// Snapshot directory
    pub path: PathBuf,
    /// Files transferred by this call
    pub files: usize,
    /// Bytes transferred by this call
    pub bytes: u64,
}

enum PlannedFile {
    Registry { repo: ModelId, revision: String, file: RemoteFile },
    Url { file_name: &'static str, url: &'static str },
}

impl PlannedFile {
    fn local_path(&self) -> &str {
        match self {
            PlannedFile::Registry { file, .. } => file.path.as_str(),
            PlannedFile::Url { file_name, .. } => *file_name,
        }
    }
}

/// Dispatches acquisition to a download strategy
pub struct DownloadResolver {
    /// Remote registry client
    remote: Arc<dyn RemoteRegistry>,

    /// Local artifact store the files are written into
    store: LocalArtifactStore,
}

impl DownloadResolver {
    /// Creates a new resolver
    pub fn new(remote: Arc<dyn RemoteRegistry>, store: LocalArtifactStore) -> Self {
        Self { remote, store }
    }

    /// Fetches `id` into the local store
    ///
    /// Does not check whether `id` is already present; files that already
    /// exist in the target snapshot are skipped, so a retried pull resumes.
    pub async fn acquire(&self, id: &ModelId, options: &PullOptions) -> Result<AcquireReport> {
        let filter = FileFilter::new(options)?;

        let strategy = DownloadStrategy::resolve(id);
        debug!("Acquiring model {} with strategy {:?}", id, strategy);

        let (revision, plan) = match strategy {
            DownloadStrategy::Bundle(kind) => self.plan_bundle(kind, &filter).await?,
            DownloadStrategy::Snapshot => self.plan_snapshot(id, &filter).await?,
        };

        if plan.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "no files of {} match the requested patterns",
                id
            )));
        }

        self.execute(id, &revision, plan).await
    }

    async fn plan_snapshot(&self, id: &ModelId, filter: &FileFilter) -> Result<(String, Vec<PlannedFile>)> {
        let tree = self.remote.list_files(id).await?;

        let plan = tree
            .files
            .into_iter()
            .filter(|file| filter.matches(&file.path))
            .map(|file| PlannedFile::Registry {
                repo: id.clone(),
                revision: tree.revision.clone(),
                file,
            })
            .collect();

        Ok((tree.revision, plan))
    }

    /// Lists every registry component before anything is written, so an
    /// unknown repository fails the pull without side effects.
    async fn plan_bundle(&self, kind: BundleKind, filter: &FileFilter) -> Result<(String, Vec<PlannedFile>)> {
        let mut revision = None;
        let mut plan = Vec::new();

        for component in kind.components() {
            match *component {
                BundleComponent::RegistryFiles { repo, patterns } => {
                    let repo = ModelId::new(repo)?;
                    let selection = FileFilter::from_patterns(Some(patterns), None)?;
                    let tree = self.remote.list_files(&repo).await?;

                    revision.get_or_insert_with(|| tree.revision.clone());

                    plan.extend(
                        tree.files
                            .into_iter()
                            .filter(|file| selection.matches(&file.path) && filter.matches(&file.path))
                            .map(|file| PlannedFile::Registry {
                                repo: repo.clone(),
                                revision: tree.revision.clone(),
                                file,
                            }),
                    );
                }
                BundleComponent::Url { file_name, url } => {
                    if filter.matches(file_name) {
                        plan.push(PlannedFile::Url { file_name, url });
                    }
                }
            }
        }

        Ok((revision.unwrap_or_else(|| DEFAULT_REF.to_string()), plan))
    }

    async fn execute(&self, id: &ModelId, revision: &str, plan: Vec<PlannedFile>) -> Result<AcquireReport> {
        let snapshot = self.store.snapshot_dir(id, revision);
        tokio::fs::create_dir_all(&snapshot).await?;

        info!("Downloading {} file(s) of model {} into {:?}", plan.len(), id, snapshot);

        let mut files = 0;
        let mut bytes = 0;

        for planned in &plan {
            let dest = safe_join(&snapshot, planned.local_path())?;

            if tokio::fs::try_exists(&dest).await? {
                debug!("File already present: {:?}", dest);
                continue;
            }

            let written = match planned {
                PlannedFile::Registry { repo, revision, file } => {
                    self.remote.download_file(repo, revision, file, &dest).await?
                }
                PlannedFile::Url { url, .. } => self.remote.download_url(url, &dest).await?,
            };

            debug!("Downloaded {} ({} bytes)", planned.local_path(), written);

            files += 1;
            bytes += written;
        }

        self.store.commit_snapshot(id, revision)?;

        Ok(AcquireReport {
            revision: revision.to_string(),
            path: snapshot,
            files,
            bytes,
        })
    }
}

/// Joins a remote relative path onto the snapshot, refusing escapes
fn safe_join(root: &Path, relative: &str) -> Result<PathBuf> {
    let path = Path::new(relative);
    let safe = !relative.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if !safe {
        return Err(Error::InvalidArgument(format!(
            "remote file path escapes the snapshot: {:?}",
            relative
        )));
    }

    Ok(root.join(path))
}
