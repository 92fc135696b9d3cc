//! Error kinds callers can branch on.
//!
//! Operations return `anyhow::Result`; the typed errors below travel inside
//! the `anyhow::Error` and can be recovered with `downcast_ref`. Filesystem
//! failures are never wrapped in a variant: the original `std::io::Error`
//! stays in the chain and is inspected with [`io_error_kind`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    /// A required setup value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The package identity cannot be turned into install paths.
    #[error("Invalid package '{spec}': {reason}")]
    InvalidPackage { spec: String, reason: String },

    /// The install lock could not be acquired in time. Nothing was modified,
    /// so the whole operation can be retried later.
    #[error("Timed out waiting for lock {path:?} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },

    /// Staging and install directories live on different filesystems, so
    /// promotion cannot be atomic.
    #[error(
        "Cannot promote {staging:?} to {target:?}: staging and install directories must be on the same filesystem"
    )]
    CrossDevice { staging: PathBuf, target: PathBuf },
}

impl InstallError {
    pub fn invalid_package(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        InstallError::InvalidPackage {
            spec: spec.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by a package registry beyond plain HTTP errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Version {version} of '{name}' is not published in the registry")]
    VersionNotFound { name: String, version: String },

    /// The downloaded tarball does not match the published digest.
    #[error("Integrity check failed for {package}: expected {expected}, got {actual}")]
    Integrity {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid tarball for {package}: {reason}")]
    InvalidTarball { package: String, reason: String },
}

/// Kind of the first `std::io::Error` found in the error chain, if any.
pub fn io_error_kind(err: &anyhow::Error) -> Option<io::ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .map(io::Error::kind)
}

/// Whether the error is a filesystem "does not exist" failure.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    io_error_kind(err) == Some(io::ErrorKind::NotFound)
}
