//! Common utilities and types for the model lifecycle manager
//!
//! This crate provides the error type, the model identifier and the pull
//! request/outcome types shared by every other crate in the workspace.

pub mod error;
pub mod models;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{Error, Result};
pub use models::ModelId;
pub use types::{PullOptions, PullOutcome};
