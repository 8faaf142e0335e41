//! # Path Mapper
//!
//! Derives the canonical local storage path for a requested URL. The scheme
//! and authority are dropped so the cache tree mirrors the remote hierarchy
//! starting at the host segment.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::ProxyError;

/// Maps request URLs to storage paths under a fixed cache root.
#[derive(Debug, Clone)]
pub struct PathMapper {
    cache_dir: PathBuf,
}

impl PathMapper {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Map a request URL to its local storage path.
    ///
    /// The first two `/`-separated segments (scheme and the empty authority
    /// separator) are dropped; the host and the remaining path segments become
    /// directory segments under the cache root. Deterministic: the same URL
    /// always maps to the same path.
    ///
    /// Any `..` segment is rejected before the path can be used for reads or
    /// writes, so a crafted URL can never resolve outside the cache root.
    pub fn map(&self, url: &str) -> Result<PathBuf, ProxyError> {
        let mut dest = self.cache_dir.clone();

        for segment in url.split('/').skip(2) {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." {
                warn!(url, "rejecting request with parent-directory segment");
                return Err(ProxyError::PathTraversal(url.to_owned()));
            }
            dest.push(segment);
        }

        // A segment cannot contain a separator (we split on it), so the join
        // above stays under the root; verify anyway before handing the path out.
        if !dest.starts_with(&self.cache_dir)
            || dest
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            warn!(url, path = %dest.display(), "mapped path escapes the cache root");
            return Err(ProxyError::PathTraversal(url.to_owned()));
        }

        Ok(dest)
    }
}
