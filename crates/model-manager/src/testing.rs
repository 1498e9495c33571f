//! In-memory fakes shared by the unit tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use common::error::{Error, Result};
use common::models::ModelId;

use crate::hub::{RemoteFile, RemoteRegistry, RemoteTree};

/// Remote registry backed by in-memory repositories
#[derive(Default)]
pub struct FakeRegistry {
    repos: HashMap<String, Vec<(String, Vec<u8>)>>,
    urls: HashMap<String, Vec<u8>>,
    failing: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
    pub listings: AtomicUsize,
    pub downloaded: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn with_repo(mut self, repo: &str, files: &[(&str, &str)]) -> Self {
        self.repos.insert(
            repo.to_string(),
            files
                .iter()
                .map(|(path, body)| (path.to_string(), body.as_bytes().to_vec()))
                .collect(),
        );
        self
    }

    pub fn with_url(mut self, url: &str, body: &str) -> Self {
        self.urls.insert(url.to_string(), body.as_bytes().to_vec());
        self
    }

    /// Makes every listing wait for a permit of `gate`
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Makes downloads of `path` fail with `TransferFailed`
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().push(path.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn network_calls(&self) -> usize {
        self.listings.load(Ordering::SeqCst) + self.downloaded.lock().len()
    }

    pub fn downloaded_files(&self) -> Vec<String> {
        let mut files = self.downloaded.lock().clone();
        files.sort();
        files
    }

    async fn write(&self, name: &str, body: &[u8], dest: &Path) -> Result<u64> {
        if self.failing.lock().iter().any(|f| f == name) {
            return Err(Error::TransferFailed(format!("connection reset while fetching {}", name)));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, body).await?;
        self.downloaded.lock().push(name.to_string());
        Ok(body.len() as u64)
    }
}

#[async_trait]
impl RemoteRegistry for FakeRegistry {
    async fn list_files(&self, repo: &ModelId) -> Result<RemoteTree> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let files = self
            .repos
            .get(repo.as_str())
            .ok_or_else(|| Error::NotFound(format!("Repository not found: {}", repo)))?;
        Ok(RemoteTree {
            revision: "rev1".to_string(),
            files: files
                .iter()
                .map(|(path, body)| RemoteFile {
                    path: path.clone(),
                    size: Some(body.len() as u64),
                    sha256: None,
                })
                .collect(),
        })
    }

    async fn download_file(
        &self,
        repo: &ModelId,
        _revision: &str,
        file: &RemoteFile,
        dest: &Path,
    ) -> Result<u64> {
        let body = self
            .repos
            .get(repo.as_str())
            .and_then(|files| files.iter().find(|(path, _)| *path == file.path))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| Error::TransferFailed(format!("HTTP 404 for {}", file.path)))?;
        self.write(&file.path, &body, dest).await
    }

    async fn download_url(&self, url: &str, dest: &Path) -> Result<u64> {
        let body = self
            .urls
            .get(url)
            .cloned()
            .ok_or_else(|| Error::TransferFailed(format!("HTTP 404 for {}", url)))?;
        self.write(url, &body, dest).await
    }
}
