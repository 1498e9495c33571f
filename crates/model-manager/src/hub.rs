//! Remote model registry client
//!
//! [`RemoteRegistry`] is the seam the download strategies talk to.
//! [`HubClient`] implements it against a Hugging Face compatible HTTP API.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use common::error::{Error, Result};
use common::models::ModelId;
use lifecycle_config::HubSettings;
use storage_adapter::{DEFAULT_REF, INCOMPLETE_SUFFIX};

/// One file of a remote repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Path relative to the repository root
    pub path: String,
    /// Size in bytes, when the registry reports it
    pub size: Option<u64>,
    /// sha256 of the content, published for large (LFS) files
    pub sha256: Option<String>,
}

impl RemoteFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            sha256: None,
        }
    }
}

/// Listing of a remote repository at one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTree {
    /// Commit the listing was taken at
    pub revision: String,
    /// Every file in the repository
    pub files: Vec<RemoteFile>,
}

/// Remote model registry operations used by the download strategies
#[async_trait]
pub trait RemoteRegistry: Send + Sync {
    /// Lists the files of `repo`; fails with `NotFound` for unknown repositories
    async fn list_files(&self, repo: &ModelId) -> Result<RemoteTree>;

    /// Downloads one file of `repo` to `dest`, returning the bytes written
    async fn download_file(
        &self,
        repo: &ModelId,
        revision: &str,
        file: &RemoteFile,
        dest: &Path,
    ) -> Result<u64>;

    /// Downloads an arbitrary URL to `dest`, returning the bytes written
    async fn download_url(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// `dest` with the in-progress suffix appended
pub fn incomplete_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(INCOMPLETE_SUFFIX);
    PathBuf::from(name)
}

#[derive(Debug, Deserialize)]
struct ModelInfoResponse {
    sha: Option<String>,
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
    size: Option<u64>,
    lfs: Option<LfsInfo>,
}

#[derive(Debug, Deserialize)]
struct LfsInfo {
    sha256: String,
    size: Option<u64>,
}

fn parse_tree(body: &str) -> Result<RemoteTree> {
    let info: ModelInfoResponse = serde_json::from_str(body)?;
    let files = info
        .siblings
        .into_iter()
        .map(|s| {
            let lfs_size = s.lfs.as_ref().and_then(|l| l.size);
            RemoteFile {
                path: s.rfilename,
                size: s.size.or(lfs_size),
                sha256: s.lfs.map(|l| l.sha256),
            }
        })
        .collect();

    Ok(RemoteTree {
        revision: info.sha.unwrap_or_else(|| DEFAULT_REF.to_string()),
        files,
    })
}

/// HTTP client for a Hugging Face compatible registry
pub struct HubClient {
    /// HTTP client
    client: Client,

    /// Registry base URL
    endpoint: Url,

    /// Bearer token
    token: Option<String>,

    /// Whether to verify published sha256 digests
    verify_checksums: bool,
}

impl HubClient {
    /// Creates a new client from hub settings
    pub fn new(settings: &HubSettings) -> Result<Self> {
        let endpoint = Url::parse(&settings.endpoint)
            .map_err(|e| Error::Config(format!("invalid hub endpoint {:?}: {}", settings.endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "hub endpoint is not a base URL: {:?}",
                settings.endpoint
            )));
        }

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            token: settings.token.clone(),
            verify_checksums: settings.verify_checksums,
        })
    }

    /// Endpoint with `segments` appended, each one percent-encoded
    fn endpoint_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.endpoint.clone();
        // Endpoints that cannot be a base are rejected in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn tree_url(&self, repo: &ModelId) -> Url {
        let mut url = self.endpoint_url(
            ["api", "models"]
                .into_iter()
                .chain(repo.as_str().split('/'))
                .chain(["revision", DEFAULT_REF]),
        );
        url.set_query(Some("blobs=true"));
        url
    }

    fn file_url(&self, repo: &ModelId, revision: &str, path: &str) -> Url {
        self.endpoint_url(
            repo.as_str()
                .split('/')
                .chain(["resolve", revision])
                .chain(path.split('/')),
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Streams `url` into `<dest>.incomplete`, then renames it to `dest`
    ///
    /// The partial file is removed on every failure path.
    async fn stream_to_file(&self, url: &str, dest: &Path, expected_sha256: Option<&str>) -> Result<u64> {
        let partial = incomplete_path(dest);

        match self.stream_to_partial(url, &partial, expected_sha256).await {
            Ok(written) => {
                tokio::fs::rename(&partial, dest).await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {:?}: {}", partial, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_to_partial(&self, url: &str, partial: &Path, expected_sha256: Option<&str>) -> Result<u64> {
        if let Some(parent) = partial.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let resp = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::TransferFailed(format!("request to {} failed: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(Error::TransferFailed(format!(
                "failed to download {}: HTTP {}",
                url,
                resp.status()
            )));
        }

        let mut file = File::create(partial).await?;

        // Create hasher if we need to verify checksum
        let mut hasher = match expected_sha256 {
            Some(_) if self.verify_checksums => Some(Sha256::new()),
            _ => None,
        };

        let mut stream = resp.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::TransferFailed(format!("download of {} interrupted: {}", url, e)))?;

            file.write_all(&chunk).await?;

            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }

            downloaded += chunk.len() as u64;
        }

        file.flush().await?;
        drop(file);

        if let (Some(hasher), Some(expected)) = (hasher, expected_sha256) {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::TransferFailed(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    url, expected, actual
                )));
            }
            debug!("Checksum verified for {}", url);
        }

        Ok(downloaded)
    }
}

#[async_trait]
impl RemoteRegistry for HubClient {
    async fn list_files(&self, repo: &ModelId) -> Result<RemoteTree> {
        let url = self.tree_url(repo);
        debug!("Listing remote files for {} from {}", repo, url);

        let resp = self
            .authorized(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| Error::TransferFailed(format!("request to {} failed: {}", url, e)))?;

        match resp.status() {
            // The hub answers 401 rather than 404 for repositories that do
            // not exist, so they cannot be told apart from private ones.
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED => {
                return Err(Error::NotFound(format!("Repository not found: {}", repo)));
            }
            status if !status.is_success() => {
                return Err(Error::TransferFailed(format!(
                    "failed to list files of {}: HTTP {}",
                    repo, status
                )));
            }
            _ => {}
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::TransferFailed(format!("failed to read listing of {}: {}", repo, e)))?;

        parse_tree(&body)
    }

    async fn download_file(
        &self,
        repo: &ModelId,
        revision: &str,
        file: &RemoteFile,
        dest: &Path,
    ) -> Result<u64> {
        let url = self.file_url(repo, revision, &file.path);
        self.stream_to_file(url.as_str(), dest, file.sha256.as_deref()).await
    }

    async fn download_url(&self, url: &str, dest: &Path) -> Result<u64> {
        self.stream_to_file(url, dest, None).await
    }
}
