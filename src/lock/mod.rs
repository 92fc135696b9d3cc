//! Cross-process mutual exclusion for install slots.
//!
//! A [`Locker`] hands out [`LockHandle`]s for lock-file paths. Callers should
//! not pair `acquire` and `release` by hand: [`LockGuard`] releases the lock
//! when it is dropped, and [`synchronize`] runs a critical section under a
//! guard, so the lock is released exactly once whether the section returns,
//! fails, or its future is dropped.

mod file;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use file::FileLocker;

/// Shortest pause between two acquisition attempts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Acquisition parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Upper bound on the total time spent waiting for the lock.
    pub wait: Duration,
    /// A lock token older than this is considered abandoned.
    pub stale: Duration,
    /// Number of retries after the first attempt.
    pub retries: u32,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(10),
            stale: Duration::from_secs(60),
            retries: 10,
        }
    }
}

impl LockOptions {
    /// Pause between attempts: the wait window spread over the retries.
    pub fn poll_interval(&self) -> Duration {
        (self.wait / self.retries.max(1)).max(MIN_POLL_INTERVAL)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Exclusive access to one lock path.
#[derive(Debug, PartialEq, Eq)]
pub struct LockHandle {
    path: PathBuf,
    token: Option<String>,
}

impl LockHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            token: None,
        }
    }

    /// Handle remembering the token written at `path`, so release can tell
    /// our token from one written by a later holder.
    pub fn with_token(path: impl Into<PathBuf>, token: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            token: Some(token.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Lock manager keyed by lock-file path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Locker: Send + Sync {
    /// Wait for exclusive access to `path`.
    ///
    /// Fails with [`crate::error::InstallError::LockTimeout`] once the wait
    /// budget is spent. Dropping the returned future before it resolves
    /// leaves nothing acquired.
    async fn acquire(&self, path: &Path, options: &LockOptions) -> Result<LockHandle>;

    /// Give up a lock obtained from [`Locker::acquire`].
    fn release(&self, handle: LockHandle) -> Result<()>;
}

/// Scope guard releasing its lock on [`LockGuard::release`] or on drop.
pub struct LockGuard<'a, L: Locker + ?Sized> {
    locker: &'a L,
    handle: Option<LockHandle>,
}

impl<'a, L: Locker + ?Sized> LockGuard<'a, L> {
    pub async fn acquire(locker: &'a L, path: &Path, options: &LockOptions) -> Result<Self> {
        debug!("Locking {:?}", path);
        let handle = locker.acquire(path, options).await?;
        Ok(Self {
            locker,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.handle.as_ref().map(LockHandle::path)
    }

    /// Release now and report the outcome.
    pub fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => {
                debug!("Unlocking {:?}", handle.path());
                self.locker.release(handle)
            }
            None => Ok(()),
        }
    }
}

impl<L: Locker + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Unlocking {:?} (guard dropped)", handle.path());
            let path = handle.path().to_path_buf();
            if let Err(e) = self.locker.release(handle) {
                warn!("Failed to release lock {:?}: {:#}", path, e);
            }
        }
    }
}

/// Run `critical_section` while holding the lock at `path`.
///
/// The critical section's error wins over a release error; a release error
/// alone fails the call.
pub async fn synchronize<L, F, Fut, T>(
    locker: &L,
    path: &Path,
    options: &LockOptions,
    critical_section: F,
) -> Result<T>
where
    L: Locker + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let guard = LockGuard::acquire(locker, path, options).await?;
    let result = critical_section().await;
    let released = guard.release();

    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!("Failed to release lock {:?}: {:#}", path, release_err);
            Err(e)
        }
    }
}
