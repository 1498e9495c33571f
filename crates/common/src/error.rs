//! Error types for the common crate
//!
//! Every operation of the lifecycle manager reports failures through this one
//! enum, so callers can tell a missing model from a conflict or a transient
//! transfer problem without string matching.

use thiserror::Error;

/// Result type for model lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for model lifecycle operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model does not exist remotely, locally, or in the registry
    #[error("Not found: {0}")]
    NotFound(String),

    /// A registry entry already exists for the model
    #[error("Model already loaded: {0}")]
    AlreadyLoaded(String),

    /// The registry entry cannot be torn down right now
    #[error("Model in use: {0}")]
    InUse(String),

    /// A download was interrupted or produced corrupt data
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Model initialization failed
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Network access is disabled
    #[error("Offline: {0}")]
    Offline(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true if the request conflicts with the current registry state
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::AlreadyLoaded(_) | Error::InUse(_))
    }

    /// Returns true if retrying the whole operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransferFailed(_))
    }
}
