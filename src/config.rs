use anyhow::{Context, Result};
use log::info;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::InstallError;
use crate::http::HttpClient;
use crate::installer::{Installer, InstallerOptions};
use crate::lock::{FileLocker, LockOptions};
use crate::registry::NpmRegistry;
use crate::runtime::Runtime;

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// `~/.pkgslot`
#[tracing::instrument(skip(runtime))]
pub fn default_base_dir<R: Runtime + ?Sized>(runtime: &R) -> Result<PathBuf> {
    let home_dir = runtime.home_dir().ok_or_else(|| {
        InstallError::Configuration(
            "Could not find home directory; pass --base-dir or set PKGSLOT_HOME".to_string(),
        )
    })?;
    Ok(home_dir.join(".pkgslot"))
}

/// Settings of the command-line front end, resolved against defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_dir: PathBuf,
    pub registry_url: String,
    pub lock: LockOptions,
}

impl Config {
    pub fn new<R: Runtime + ?Sized>(
        runtime: &R,
        base_dir: Option<PathBuf>,
        registry_url: Option<String>,
    ) -> Result<Self> {
        let base_dir = match base_dir {
            Some(path) => path,
            None => default_base_dir(runtime)?,
        };
        info!("Using install root: {}", base_dir.display());

        Ok(Self {
            base_dir,
            registry_url: registry_url.unwrap_or_else(|| DEFAULT_REGISTRY.to_string()),
            lock: LockOptions::default(),
        })
    }

    /// Wire the npm registry, file locks and the installer together.
    pub fn into_installer<R: Runtime + 'static>(
        self,
        runtime: Arc<R>,
    ) -> Result<Installer<R, NpmRegistry<R>, FileLocker<R>>> {
        let client = Client::builder()
            .user_agent(concat!("pkgslot/", env!("PKGSLOT_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let registry = NpmRegistry::new(
            &self.registry_url,
            HttpClient::new(client),
            Arc::clone(&runtime),
        )?;
        let locker = FileLocker::new(Arc::clone(&runtime));

        Installer::new(
            runtime,
            registry,
            locker,
            InstallerOptions {
                base_dir: Some(self.base_dir),
                lock: self.lock,
            },
        )
    }
}
