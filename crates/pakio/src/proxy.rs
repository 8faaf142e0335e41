//! # Cache Proxy
//!
//! Orchestrates one request end to end: map the URL to its storage path,
//! evaluate freshness, run a coordinated fetch when needed, then describe the
//! stored object for the response layer to stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use reqwest::Client;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ProxyConfig;
use crate::coordinator::{FetchCoordinator, FetchOutcome};
use crate::error::ProxyError;
use crate::fetcher::{Fetcher, create_client};
use crate::freshness::{Freshness, FreshnessPolicy};
use crate::lock::{FileLockService, LockService};
use crate::mapper::PathMapper;
use crate::mime;

/// Bound on coordinated fetch rounds for one request. A follower re-enters the
/// coordinator when the leader it waited on failed to materialize the object.
const MAX_FETCH_ATTEMPTS: usize = 3;

/// Everything the response layer needs to serve a stored object.
#[derive(Debug, Clone)]
pub struct ServedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<&'static str>,
}

/// The caching decision engine, shared between all request workers.
pub struct CacheProxy {
    mapper: PathMapper,
    policy: FreshnessPolicy,
    coordinator: FetchCoordinator,
    fetcher: Fetcher,
}

impl CacheProxy {
    /// Create a proxy with the default cross-process lock service, backed by
    /// lock files under the cache root.
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let client = create_client(config)?;
        let locks: Arc<dyn LockService> = Arc::new(FileLockService::new(
            config.cache_dir.join(".locks"),
            config.wait_timeout,
        ));
        Ok(Self::with_lock_service(config, client, locks))
    }

    /// Create a proxy with an explicit lock service, e.g. an in-process one
    /// for single-process deployments.
    pub fn with_lock_service(
        config: &ProxyConfig,
        client: Client,
        locks: Arc<dyn LockService>,
    ) -> Self {
        Self {
            mapper: PathMapper::new(&config.cache_dir),
            policy: FreshnessPolicy::new(config.metadata_files.clone(), config.metadata_keep),
            coordinator: FetchCoordinator::new(locks, config.poll_interval, config.wait_timeout),
            fetcher: Fetcher::new(client),
        }
    }

    /// Handle one request for the absolute URL `raw_url`.
    pub async fn handle(&self, raw_url: &str) -> Result<ServedFile, ProxyError> {
        info!(url = raw_url, "GET");
        let local = self.mapper.map(raw_url)?;

        // Safeguard against a browser walking the tree directly.
        if fs::metadata(&local).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(ProxyError::DirectoryListing(local));
        }

        self.ensure_cached(raw_url, &local).await?;

        let meta = fs::metadata(&local).await?;
        let file_name = local
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_owned();
        let (content_type, content_encoding) = mime::guess_type(&local);

        info!(path = %local.display(), size = meta.len(), "send file");
        Ok(ServedFile {
            path: local,
            file_name,
            size: meta.len(),
            content_type,
            content_encoding,
        })
    }

    /// Make sure a fresh copy of `url` exists at `local`.
    ///
    /// Lock clearance does not imply the leader succeeded, so after a wait the
    /// disk state is re-evaluated and the fetch re-entered if the object is
    /// still missing or stale, up to [`MAX_FETCH_ATTEMPTS`] rounds.
    async fn ensure_cached(&self, url: &str, local: &Path) -> Result<(), ProxyError> {
        let key = local.to_string_lossy().into_owned();

        for attempt in 0..MAX_FETCH_ATTEMPTS {
            let freshness = self.policy.evaluate(local, SystemTime::now()).await?;
            if freshness == Freshness::Fresh {
                if attempt == 0 {
                    info!(path = %local.display(), "cache hit");
                }
                return Ok(());
            }

            // Only now does the URL have to be fetchable.
            Url::parse(url).map_err(|e| ProxyError::UrlError(format!("{url}: {e}")))?;

            warn!(url, path = %local.display(), attempt, "fetching");
            let refresh = freshness == Freshness::Stale;
            let outcome = self
                .coordinator
                .coordinate(&key, || self.fetcher.fetch(url, local, refresh))
                .await?;

            match outcome {
                FetchOutcome::Led(status) => {
                    debug!(url, %status, "download finished");
                    return Ok(());
                }
                // The leader may have failed without materializing the file;
                // loop to re-evaluate and, if needed, fetch ourselves.
                FetchOutcome::Waited => {
                    debug!(url, "download finished by another worker, re-checking");
                }
            }
        }

        warn!(url, "object still unavailable after waiting on other workers");
        Err(ProxyError::LockTimeout(key))
    }
}
