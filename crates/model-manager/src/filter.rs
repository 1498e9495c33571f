//! Allow/deny file selection
//!
//! Patterns follow the remote registry's fnmatch convention: `*` also
//! crosses `/`, and a pattern ending in `/` selects everything below that
//! directory.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use common::error::{Error, Result};
use common::types::PullOptions;

/// Compiled allow/deny pattern lists
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    allow: Option<GlobSet>,
    deny: Option<GlobSet>,
}

impl FileFilter {
    /// A filter that selects every file
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Compiles the patterns of a pull request
    pub fn new(options: &PullOptions) -> Result<Self> {
        Self::from_patterns(options.allow.as_deref(), options.deny.as_deref())
    }

    /// Compiles optional allow and deny lists
    pub fn from_patterns<S: AsRef<str>>(allow: Option<&[S]>, deny: Option<&[S]>) -> Result<Self> {
        Ok(Self {
            allow: allow.map(compile).transpose()?,
            deny: deny.map(compile).transpose()?,
        })
    }

    /// Is `path` selected? `deny` wins over `allow`.
    pub fn matches(&self, path: &str) -> bool {
        if let Some(deny) = &self.deny {
            if deny.is_match(path) {
                return false;
            }
        }
        match &self.allow {
            Some(allow) => allow.is_match(path),
            None => true,
        }
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let normalized = if pattern.ends_with('/') {
            format!("{}*", pattern)
        } else {
            pattern.to_string()
        };
        let glob = GlobBuilder::new(&normalized)
            .literal_separator(false)
            .build()
            .map_err(|e| Error::InvalidArgument(format!("invalid pattern {:?}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::InvalidArgument(format!("invalid pattern set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(allow: Option<&[&str]>, deny: Option<&[&str]>) -> FileFilter {
        FileFilter::from_patterns(allow, deny).unwrap()
    }

    #[test]
    fn test_no_lists_selects_everything() {
        let f = FileFilter::accept_all();
        assert!(f.matches("README.md"));
        assert!(f.matches("nested/dir/model.bin"));
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let f = filter(Some(&["*.onnx"]), Some(&["*-quantized.onnx"]));
        assert!(f.matches("model.onnx"));
        assert!(!f.matches("model-quantized.onnx"));
        assert!(!f.matches("README.md"));
    }

    #[test]
    fn test_star_crosses_directories() {
        let f = filter(Some(&["*.onnx"]), None);
        assert!(f.matches("en/en_US/amy/low/en_US-amy-low.onnx"));
    }

    #[test]
    fn test_trailing_slash_selects_directory() {
        let f = filter(Some(&["onnx/"]), None);
        assert!(f.matches("onnx/model.onnx"));
        assert!(!f.matches("model.onnx"));
    }

    #[test]
    fn test_empty_allow_list_selects_nothing() {
        let f = filter(Some(&[]), None);
        assert!(!f.matches("model.onnx"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = FileFilter::new(&PullOptions::allow(["[unclosed"])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
