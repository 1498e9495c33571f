//! Standard hub environment variables
//!
//! Tools sharing the hub cache agree on a handful of variables. They are
//! mapped onto settings keys and applied after every other source.

use std::path::PathBuf;

pub const HF_HUB_CACHE: &str = "HF_HUB_CACHE";
pub const HF_HOME: &str = "HF_HOME";
pub const HF_ENDPOINT: &str = "HF_ENDPOINT";
pub const HF_TOKEN: &str = "HF_TOKEN";
pub const HF_HUB_OFFLINE: &str = "HF_HUB_OFFLINE";

/// Overrides derived from the hub variables
#[derive(Debug, Default, PartialEq)]
pub struct HubEnvironment {
    pub cache_dir: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub offline: Option<bool>,
}

impl HubEnvironment {
    /// Reads the variables through `lookup`
    ///
    /// `HF_HUB_CACHE` wins over `HF_HOME`, which points one level above the
    /// hub cache.
    pub fn read(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cache_dir = non_empty(HF_HUB_CACHE)
            .map(PathBuf::from)
            .or_else(|| non_empty(HF_HOME).map(|home| PathBuf::from(home).join("hub")));

        Self {
            cache_dir,
            endpoint: non_empty(HF_ENDPOINT),
            token: non_empty(HF_TOKEN),
            offline: non_empty(HF_HUB_OFFLINE).map(|v| parse_bool(&v)),
        }
    }
}

/// Parses the truthy spellings accepted by the hub tooling
pub fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "on"
    )
}
