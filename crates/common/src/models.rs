//! Model identifiers
//!
//! A [`ModelId`] names one artifact across the local cache, the remote
//! registry and the in-memory registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hub repository identifier, `name` or `namespace/name`
///
/// The identifier is used to build cache paths, so construction applies the
/// registry's repo-id rules: ASCII letters, digits, `-`, `_` and `.` only, no
/// `--` or `..`, and no segment starting or ending with `-` or `.`. Under
/// these rules the `models--namespace--name` cache folder of an identifier
/// is unique to it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(String);

/// Longest identifier accepted by the registry
pub const MAX_MODEL_ID_LEN: usize = 96;

impl ModelId {
    /// Creates a validated model identifier
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidArgument("model id is empty".to_string()));
        }

        if id.len() > MAX_MODEL_ID_LEN {
            return Err(Error::InvalidArgument(format!(
                "model id is longer than {} characters: {:?}",
                MAX_MODEL_ID_LEN, id
            )));
        }

        if id.split('/').count() > 2 {
            return Err(Error::InvalidArgument(format!(
                "model id must be `name` or `namespace/name`: {:?}",
                id
            )));
        }

        for segment in id.split('/') {
            validate_segment(segment).map_err(|reason| {
                Error::InvalidArgument(format!("model id {:?} is invalid: {}", id, reason))
            })?;
        }

        Ok(Self(id))
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_segment(segment: &str) -> std::result::Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty segment");
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("only ASCII letters, digits, '-', '_' and '.' are allowed");
    }
    if segment.contains("--") || segment.contains("..") {
        return Err("'--' and '..' are not allowed");
    }
    if segment.starts_with(['-', '.']) || segment.ends_with(['-', '.']) {
        return Err("segments cannot start or end with '-' or '.'");
    }
    Ok(())
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ModelId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.0
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
