//! # Freshness Policy
//!
//! Classifies a cached object as absent, fresh, or stale. Metadata files
//! (repository indexes) must expire or clients would never see updates again;
//! everything else is content-addressed by its URL and never changes, so a
//! stored copy is served forever.

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::debug;

/// Result of evaluating a cached object against the freshness policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No object stored at the path; a fetch is required
    Absent,
    /// The stored object can be served directly
    Fresh,
    /// A metadata object past its retention window; a re-fetch is required
    Stale,
}

/// Time-based expiry for metadata files, permanent retention for the rest.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    metadata_files: HashSet<String>,
    metadata_keep: Duration,
}

impl FreshnessPolicy {
    pub fn new(metadata_files: HashSet<String>, metadata_keep: Duration) -> Self {
        Self {
            metadata_files,
            metadata_keep,
        }
    }

    /// Whether the final path segment names a metadata file.
    pub fn is_metadata(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.metadata_files.contains(name))
    }

    /// Classify the object at `path` as of the instant `now`.
    ///
    /// `now` is passed in by the caller so retention-window boundaries can be
    /// exercised without touching the clock.
    pub async fn evaluate(&self, path: &Path, now: SystemTime) -> io::Result<Freshness> {
        let meta = match fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Freshness::Absent),
            Err(e) => return Err(e),
        };

        if !self.is_metadata(path) {
            return Ok(Freshness::Fresh);
        }

        let mtime = meta.modified()?;
        let age = now.duration_since(mtime).unwrap_or_default();
        let freshness = if age < self.metadata_keep {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };

        debug!(
            path = %path.display(),
            age_s = age.as_secs(),
            keep_s = self.metadata_keep.as_secs(),
            ?freshness,
            "evaluated metadata file"
        );

        Ok(freshness)
    }
}
