//! Local artifact storage for the model lifecycle manager
//!
//! Answers whether a model is present on local storage and exposes the cache
//! path layout. Files are only written by the download strategies in
//! `model-manager`.

pub mod cache;

// Re-export commonly used types
pub use cache::{LocalArtifactStore, LocalFile, DEFAULT_REF, INCOMPLETE_SUFFIX};
