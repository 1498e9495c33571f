//! Model lifecycle management
//!
//! This crate pulls model artifacts from a remote registry into the local
//! store, loads them into a shared in-memory registry and unloads them.

pub mod bundle;
pub mod filter;
pub mod hub;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod resolver;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use bundle::BundleKind;
pub use filter::FileFilter;
pub use hub::{HubClient, RemoteFile, RemoteRegistry, RemoteTree};
pub use loader::{ArtifactLoader, LoadedArtifact, ModelLoader};
pub use manager::ModelManager;
pub use registry::ModelRegistry;
pub use resolver::{AcquireReport, DownloadResolver, DownloadStrategy};
