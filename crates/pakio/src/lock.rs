//! # Download Locks
//!
//! The mutual-exclusion capability behind single-flight downloads. The
//! coordinator only talks to the [`LockService`] trait, so the mechanism is
//! swappable: an in-process implementation for single-process deployments and
//! tests, and a lock-file implementation that is valid across cooperating OS
//! processes sharing the same cache root.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Mutual exclusion keyed by cache path.
///
/// `try_acquire` must be atomic: two workers racing on the same key must never
/// both observe "not held" and both proceed. Each implementation serializes its
/// own check-then-act sequence.
#[async_trait::async_trait]
pub trait LockService: Send + Sync {
    /// Attempt to take the lock for `key`. Returns `true` when this caller
    /// now owns it, `false` when another worker already holds it.
    async fn try_acquire(&self, key: &str) -> io::Result<bool>;

    /// Release the lock for `key`. Releasing a lock that is not held is not an
    /// error; the next requester must never be stuck behind a failed fetch.
    async fn release(&self, key: &str) -> io::Result<()>;

    /// Whether any worker currently holds the lock for `key`.
    async fn is_held(&self, key: &str) -> io::Result<bool>;
}

/// In-process lock service backed by a mutex-guarded key set.
///
/// Sufficient when all request workers live in one process.
#[derive(Debug, Default)]
pub struct TaskLockService {
    held: Mutex<HashSet<String>>,
}

impl TaskLockService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LockService for TaskLockService {
    async fn try_acquire(&self, key: &str) -> io::Result<bool> {
        Ok(self.held.lock().insert(key.to_owned()))
    }

    async fn release(&self, key: &str) -> io::Result<()> {
        self.held.lock().remove(key);
        Ok(())
    }

    async fn is_held(&self, key: &str) -> io::Result<bool> {
        Ok(self.held.lock().contains(key))
    }
}

/// Owner record stored inside a lock file, for diagnostics and staleness
/// decisions on filesystems without usable timestamps.
#[derive(Debug, Serialize, Deserialize)]
struct LockFileContents {
    pid: u32,
    started_at: u64,
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Cross-process lock service backed by lock files under the cache root.
///
/// Acquisition relies on `O_CREAT | O_EXCL` (`create_new`), which the kernel
/// serializes across processes. A crashed owner leaves its lock file behind;
/// locks older than `stale_after` are treated as abandoned and cleared.
#[derive(Debug, Clone)]
pub struct FileLockService {
    locks_dir: PathBuf,
    stale_after: Duration,
}

impl FileLockService {
    pub fn new(locks_dir: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            locks_dir: locks_dir.into(),
            stale_after,
        }
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.locks_dir.join(format!("{digest:x}.lock"))
    }

    async fn lock_age(&self, path: &PathBuf) -> io::Result<Option<Duration>> {
        match fs::metadata(path).await {
            Ok(meta) => {
                let age = meta
                    .modified()
                    .ok()
                    .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
                match age {
                    Some(age) => Ok(Some(age)),
                    None => {
                        // Fall back to the timestamp recorded in the lock file.
                        let contents = fs::read(path)
                            .await
                            .ok()
                            .and_then(|bytes| serde_json::from_slice::<LockFileContents>(&bytes).ok());
                        Ok(contents.map(|c| {
                            Duration::from_secs(now_seconds().saturating_sub(c.started_at))
                        }))
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove a lock file that exceeded `stale_after`. Returns `true` when the
    /// lock is gone afterwards.
    async fn clear_if_stale(&self, path: &PathBuf) -> io::Result<bool> {
        match self.lock_age(path).await? {
            Some(age) if age > self.stale_after => {
                warn!(path = %path.display(), age_s = age.as_secs(), "clearing stale download lock");
                match fs::remove_file(path).await {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
                    Err(e) => Err(e),
                }
            }
            Some(_) => Ok(false),
            None => Ok(true),
        }
    }
}

#[async_trait::async_trait]
impl LockService for FileLockService {
    async fn try_acquire(&self, key: &str) -> io::Result<bool> {
        fs::create_dir_all(&self.locks_dir).await?;
        let path = self.lock_path(key);

        // One retry after clearing a stale leftover from a crashed owner.
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let contents = LockFileContents {
                        pid: std::process::id(),
                        started_at: now_seconds(),
                    };
                    let serialized = serde_json::to_vec(&contents)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    file.write_all(&serialized).await?;
                    debug!(key, path = %path.display(), "download lock acquired");
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !self.clear_if_stale(&path).await? {
                        return Ok(false);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    async fn release(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.lock_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn is_held(&self, key: &str) -> io::Result<bool> {
        let path = self.lock_path(key);
        match fs::try_exists(&path).await {
            Ok(false) => Ok(false),
            Ok(true) => Ok(!self.clear_if_stale(&path).await?),
            Err(e) => Err(e),
        }
    }
}
