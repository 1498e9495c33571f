//! Request and outcome types shared by the lifecycle crates

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// File-pattern selection for a pull
///
/// A missing list means "no filter". `deny` wins over `allow`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullOptions {
    /// Only remote files matching one of these globs are fetched
    #[serde(default, alias = "allow_patterns")]
    pub allow: Option<Vec<String>>,
    /// Remote files matching one of these globs are skipped
    #[serde(default, alias = "ignore_patterns")]
    pub deny: Option<Vec<String>>,
}

impl PullOptions {
    /// Options with an allow list only
    pub fn allow<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: Some(patterns.into_iter().map(Into::into).collect()),
            deny: None,
        }
    }

    /// Adds a deny list
    pub fn with_deny<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny = Some(patterns.into_iter().map(Into::into).collect());
        self
    }
}

/// Successful result of a pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullOutcome {
    /// The artifact was already present; nothing was transferred
    AlreadyExists {
        /// Local snapshot directory
        path: PathBuf,
    },
    /// The artifact was downloaded
    Created {
        /// Local snapshot directory
        path: PathBuf,
        /// Number of files written by this pull
        files: usize,
        /// Bytes written by this pull
        bytes: u64,
    },
}

impl PullOutcome {
    /// Returns true if this pull transferred the artifact
    pub fn is_created(&self) -> bool {
        matches!(self, PullOutcome::Created { .. })
    }

    /// Local snapshot directory of the artifact
    pub fn path(&self) -> &PathBuf {
        match self {
            PullOutcome::AlreadyExists { path } | PullOutcome::Created { path, .. } => path,
        }
    }
}
