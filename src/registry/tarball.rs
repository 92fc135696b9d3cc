//! Unpacking of gzip-compressed package tarballs.
//!
//! Registry tarballs wrap the package in a single top-level directory
//! (usually `package/`). That directory is stripped so the package contents
//! land directly in the destination.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::debug;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::error::RegistryError;
use crate::runtime::Runtime;

/// Unpack `bytes` into `dest`, creating it if needed.
///
/// Links and special entries are skipped. Entries that would land outside
/// `dest` fail the whole extraction.
#[tracing::instrument(skip(runtime, bytes))]
pub fn unpack<R: Runtime + ?Sized>(
    runtime: &R,
    bytes: &[u8],
    dest: &Path,
    package: &str,
) -> Result<()> {
    let invalid = |reason: String| RegistryError::InvalidTarball {
        package: package.to_string(),
        reason,
    };

    runtime.create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| invalid(format!("cannot read archive: {}", e)))?;

    let mut files = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| invalid(format!("cannot read entry: {}", e)))?;
        let raw = entry
            .path()
            .map_err(|e| invalid(format!("cannot read entry path: {}", e)))?
            .into_owned();

        let Some(relative) = sanitize_entry_path(&raw).map_err(invalid)? else {
            continue;
        };
        let out = dest.join(&relative);
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            runtime.create_dir_all(&out)?;
        } else if entry_type.is_file() {
            if let Some(parent) = out.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut file = runtime.create_file(&out)?;
            io::copy(&mut entry, &mut file)
                .map_err(|e| invalid(format!("truncated entry {:?}: {}", raw, e)))?;
            file.flush().with_context(|| format!("Failed to write {:?}", out))?;
            drop(file);

            // Owner keeps read/write so staging can always be cleared
            if let Ok(mode) = entry.header().mode() {
                runtime.set_permissions(&out, (mode & 0o777) | 0o600)?;
            }
            files += 1;
        } else {
            debug!("Skipping {:?} entry {:?}", entry_type, raw);
        }
    }

    if files == 0 {
        return Err(invalid("archive contains no files".to_string()).into());
    }
    debug!("Unpacked {} files into {:?}", files, dest);
    Ok(())
}

/// Path of an entry relative to the package directory, without the
/// top-level directory. `Ok(None)` for the top-level directory itself.
fn sanitize_entry_path(path: &Path) -> Result<Option<PathBuf>, String> {
    let mut components = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir));

    match components.next() {
        None => return Ok(None),
        Some(Component::Normal(_)) => {}
        Some(_) => return Err(format!("entry {:?} is not a relative path", path)),
    }

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return Err(format!("entry {:?} escapes the package directory", path)),
        }
    }

    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}
