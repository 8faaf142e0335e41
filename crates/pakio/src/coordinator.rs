//! # Fetch Coordinator
//!
//! Collapses concurrent downloads of the same object into a single fetch.
//! The worker that wins the lock (the leader) performs the download; every
//! other worker (the followers) waits for the lock to clear and then
//! re-checks the cache instead of re-fetching. Completion is detected only by
//! lock absence; there is no progress channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::lock::LockService;

/// How a coordinated fetch concluded for this caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// This worker ran the fetch itself; carries the origin's status
    Led(StatusCode),
    /// Another worker's fetch completed; the caller must re-check the cache
    Waited,
}

/// Single-flight gate over an injected [`LockService`].
#[derive(Clone)]
pub struct FetchCoordinator {
    locks: Arc<dyn LockService>,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl FetchCoordinator {
    pub fn new(locks: Arc<dyn LockService>, poll_interval: Duration, wait_timeout: Duration) -> Self {
        Self {
            locks,
            poll_interval,
            wait_timeout,
        }
    }

    /// Run `fetch` under the lock for `key`, or wait for the worker that
    /// already holds it.
    ///
    /// The lock is released unconditionally when the leader's fetch returns,
    /// success or failure. A follower whose wait exceeds the configured bound
    /// gets [`ProxyError::LockTimeout`] instead of polling forever.
    pub async fn coordinate<F, Fut>(&self, key: &str, fetch: F) -> Result<FetchOutcome, ProxyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StatusCode, ProxyError>>,
    {
        if self.locks.try_acquire(key).await? {
            debug!(key, "leading the download");
            let result = fetch().await;
            let released = self.locks.release(key).await;
            let status = result?;
            released?;
            return Ok(FetchOutcome::Led(status));
        }

        let deadline = Instant::now() + self.wait_timeout;
        while self.locks.is_held(key).await? {
            if Instant::now() >= deadline {
                warn!(key, timeout_s = self.wait_timeout.as_secs(), "gave up waiting for download lock");
                return Err(ProxyError::LockTimeout(key.to_owned()));
            }
            debug!(key, "waiting for concurrent download");
            tokio::time::sleep(self.poll_interval).await;
        }

        Ok(FetchOutcome::Waited)
    }
}
