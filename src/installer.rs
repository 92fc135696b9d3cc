//! Install coordinator - makes one package version appear on disk exactly once.
//!
//! This coordinates:
//! - The lock-free fast path for packages that are already installed
//! - Cross-process locking per package identity, with a re-check under the lock
//! - Cleanup of state left behind by crashed or failed attempts
//! - Extraction into staging and atomic promotion to the install target
//!
//! Manifest resolution and version listing live here too, since they share
//! the layout and the registry.

use anyhow::Result;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{InstallError, is_not_found};
use crate::lock::{LockOptions, Locker, synchronize};
use crate::package::{InstallLayout, Manifest, PackageId};
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::staging;

/// Options for constructing an [`Installer`].
#[derive(Debug, Clone, Default)]
pub struct InstallerOptions {
    /// Install root. Required.
    pub base_dir: Option<PathBuf>,
    pub lock: LockOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    /// Install target of the package.
    pub path: PathBuf,
}

pub struct Installer<R: Runtime, G: Registry, L: Locker> {
    runtime: Arc<R>,
    registry: G,
    locker: L,
    layout: InstallLayout,
    lock_options: LockOptions,
}

impl<R: Runtime, G: Registry, L: Locker> Installer<R, G, L> {
    /// Nothing is created on disk until the first install.
    pub fn new(runtime: Arc<R>, registry: G, locker: L, options: InstallerOptions) -> Result<Self> {
        let base_dir = options.base_dir.ok_or_else(|| {
            InstallError::Configuration("No base directory configured for installs".to_string())
        })?;

        Ok(Self {
            runtime,
            registry,
            locker,
            layout: InstallLayout::new(base_dir),
            lock_options: options.lock,
        })
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn registry(&self) -> &G {
        &self.registry
    }

    fn is_installed(&self, package: &PackageId) -> Result<bool> {
        self.runtime.try_exists(&self.layout.manifest_path(package))
    }

    /// Make sure `package` is installed and return its install target.
    ///
    /// Safe to call from any number of tasks and processes at once; the
    /// package is extracted at most once.
    #[tracing::instrument(skip(self))]
    pub async fn install(&self, package: &PackageId) -> Result<InstallResult> {
        let target = self.layout.target_dir(package);

        if self.is_installed(package)? {
            debug!("{} is already installed at {:?}", package, target);
            return Ok(InstallResult { path: target });
        }

        info!("Installing missing package {}", package);
        self.runtime.create_dir_all(self.layout.locks_dir())?;
        let lock_path = self.layout.lock_path(package);

        synchronize(&self.locker, &lock_path, &self.lock_options, || {
            self.install_locked(package, &target)
        })
        .await?;

        Ok(InstallResult { path: target })
    }

    async fn install_locked(&self, package: &PackageId, target: &Path) -> Result<()> {
        if self.is_installed(package)? {
            debug!("{} was installed while waiting for the lock", package);
            return Ok(());
        }

        let runtime = self.runtime.as_ref();
        let staging_dir = self.layout.staging_dir(package);

        if staging::clear(runtime, &staging_dir)? {
            debug!("Removed leftover staging directory {:?}", staging_dir);
        }
        // A target without a manifest is what an interrupted copy looks like
        if staging::clear(runtime, target)? {
            debug!("Removed incomplete install at {:?}", target);
        }

        staging::ensure_parent(runtime, &staging_dir)?;
        debug!("Extracting {} into {:?}", package, staging_dir);
        self.registry.extract(package, &staging_dir).await?;

        staging::ensure_parent(runtime, target)?;
        staging::promote(runtime, &staging_dir, target)?;
        info!("Installed {} at {:?}", package, target);
        Ok(())
    }

    /// Declared metadata of `package`: the installed manifest if present,
    /// otherwise the registry's.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_manifest(&self, package: &PackageId) -> Result<Manifest> {
        let path = self.layout.manifest_path(package);
        match Manifest::load(self.runtime.as_ref(), &path) {
            Ok(manifest) => {
                debug!("Read manifest of {} from {:?}", package, path);
                Ok(manifest)
            }
            Err(e) if is_not_found(&e) => {
                debug!("{} is not installed, asking the registry", package);
                Ok(self.registry.fetch_manifest(package).await?.into())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        self.registry.list_versions(name).await
    }
}
