//! Lock tokens stored as files.
//!
//! Holding the lock means having created the token file exclusively. A crashed
//! holder leaves its token behind; once the token is older than
//! [`LockOptions::stale`] it is removed and the lock taken over.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use super::{LockHandle, LockOptions, Locker};
use crate::error::{InstallError, io_error_kind};
use crate::runtime::Runtime;

/// Advisory lock manager backed by lock files on the install root.
pub struct FileLocker<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> FileLocker<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    /// Try to create the token. `Ok(None)` means someone else holds it.
    fn try_create(&self, path: &Path) -> Result<Option<String>> {
        let body = token_body();
        match self.runtime.create_new(path, body.as_bytes()) {
            Ok(()) => Ok(Some(body)),
            Err(e) if io_error_kind(&e) == Some(ErrorKind::AlreadyExists) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Age of the current token, `None` if it vanished in the meantime.
    fn token_age(&self, path: &Path) -> Result<Option<Duration>> {
        match self.runtime.modified(path) {
            Ok(modified) => Ok(Some(
                SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or_default(),
            )),
            Err(e) if io_error_kind(&e) == Some(ErrorKind::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn remove_token(&self, path: &Path) -> Result<()> {
        match self.runtime.remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if io_error_kind(&e) == Some(ErrorKind::NotFound) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove lock {:?}", path)),
        }
    }

    /// One acquisition attempt, including takeover of an abandoned token.
    /// Returns the token body on success.
    fn try_acquire(&self, path: &Path, stale: Duration) -> Result<Option<String>> {
        if let Some(token) = self.try_create(path)? {
            return Ok(Some(token));
        }

        match self.token_age(path)? {
            // Released between our two calls
            None => self.try_create(path),
            Some(age) if age > stale => {
                warn!(
                    "Removing stale lock {:?} (age {:?} exceeds {:?})",
                    path, age, stale
                );
                self.remove_token(path)?;
                self.try_create(path)
            }
            Some(_) => Ok(None),
        }
    }
}

#[async_trait]
impl<R: Runtime + 'static> Locker for FileLocker<R> {
    #[tracing::instrument(skip(self, options))]
    async fn acquire(&self, path: &Path, options: &LockOptions) -> Result<LockHandle> {
        let deadline = Instant::now() + options.wait;
        let max_attempts = options.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;
            if let Some(token) = self.try_acquire(path, options.stale)? {
                debug!("Acquired lock {:?} after {} attempt(s)", path, attempts);
                return Ok(LockHandle::with_token(path, token));
            }

            let now = Instant::now();
            if attempts >= max_attempts || now >= deadline {
                return Err(InstallError::LockTimeout {
                    path: path.to_path_buf(),
                    attempts,
                }
                .into());
            }

            let delay = options.poll_interval().min(deadline - now);
            debug!(
                "Lock {:?} is held elsewhere, attempt {}/{}, retrying in {:?}",
                path, attempts, max_attempts, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    #[tracing::instrument(skip(self))]
    fn release(&self, handle: LockHandle) -> Result<()> {
        if let Some(token) = handle.token() {
            match self.runtime.read_to_string(handle.path()) {
                Ok(current) if current == token => {}
                Ok(_) => {
                    // Taken over as stale; the file now belongs to the new holder
                    warn!(
                        "Lock {:?} was taken over by another holder, leaving it in place",
                        handle.path()
                    );
                    return Ok(());
                }
                Err(e) if io_error_kind(&e) == Some(ErrorKind::NotFound) => {
                    warn!("Lock {:?} was already gone on release", handle.path());
                    return Ok(());
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to release lock {:?}", handle.path()));
                }
            }
        }

        match self.runtime.remove_file(handle.path()) {
            Ok(()) => Ok(()),
            Err(e) if io_error_kind(&e) == Some(ErrorKind::NotFound) => {
                // Taken over as stale while we were still working
                warn!("Lock {:?} was already gone on release", handle.path());
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to release lock {:?}", handle.path())),
        }
    }
}

/// Per-process counter keeping tokens unique within one millisecond.
static TOKEN_SEQ: AtomicU64 = AtomicU64::new(0);

fn token_body() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "pid={}\ncreated_at_ms={}\nseq={}\n",
        std::process::id(),
        since_epoch.as_millis(),
        TOKEN_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}
