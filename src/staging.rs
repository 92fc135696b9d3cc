//! Staging area handling and atomic promotion.
//!
//! Package contents are assembled in a disposable staging directory and made
//! visible at the install target with a single rename, so observers of the
//! target see either nothing or the complete package. Staging and target
//! must live on the same filesystem.

use anyhow::{Result, anyhow};
use log::debug;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{InstallError, io_error_kind};
use crate::runtime::Runtime;

/// Remove a directory tree if it exists. Returns whether anything was removed.
#[tracing::instrument(skip(runtime))]
pub fn clear<R: Runtime + ?Sized>(runtime: &R, dir: &Path) -> Result<bool> {
    if !runtime.try_exists(dir)? {
        return Ok(false);
    }
    debug!("Removing existing directory at {:?}...", dir);
    runtime.remove_dir_all(dir)?;
    Ok(true)
}

/// Create the parent of `target`, but not `target` itself.
///
/// An empty directory at the destination would make the rename in
/// [`promote`] fail on some platforms.
#[tracing::instrument(skip(runtime))]
pub fn ensure_parent<R: Runtime + ?Sized>(runtime: &R, target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| anyhow!("Install target {:?} has no parent directory", target))?;
    runtime.create_dir_all(parent)
}

/// Move the staged contents to `target` in one rename.
///
/// The caller guarantees that `target` does not exist and its parent does.
/// On failure the staging directory is left where it is; the next install
/// attempt clears it.
#[tracing::instrument(skip(runtime))]
pub fn promote<R: Runtime + ?Sized>(runtime: &R, staging: &Path, target: &Path) -> Result<()> {
    debug!(
        "Promoting staging directory from {:?} to {:?}...",
        staging, target
    );
    runtime.rename(staging, target).map_err(|e| {
        if io_error_kind(&e) == Some(ErrorKind::CrossesDevices) {
            InstallError::CrossDevice {
                staging: staging.to_path_buf(),
                target: target.to_path_buf(),
            }
            .into()
        } else {
            e
        }
    })
}
