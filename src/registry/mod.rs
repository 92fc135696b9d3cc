//! Package registry collaborator.
//!
//! The installer never talks to the network directly; it asks a [`Registry`]
//! for version lists and metadata and lets it unpack a package into a
//! staging directory.

mod npm;
mod tarball;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::package::{Manifest, PackageId};

pub use npm::NpmRegistry;

/// Per-version metadata as published by the registry.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistryManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dist: Option<Dist>,
}

/// Where the package archive lives and how to verify it.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Dist {
    pub tarball: String,
    #[serde(default)]
    pub integrity: Option<String>,
}

impl From<RegistryManifest> for Manifest {
    fn from(remote: RegistryManifest) -> Self {
        Manifest {
            name: remote.name,
            dependencies: remote.dependencies,
            dev_dependencies: remote.dev_dependencies,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// All published versions of a package.
    async fn list_versions(&self, name: &str) -> Result<Vec<String>>;

    /// Metadata of one exact version.
    async fn fetch_manifest(&self, package: &PackageId) -> Result<RegistryManifest>;

    /// Download the package and unpack its contents into `destination`,
    /// which must not exist yet. On failure `destination` may hold a partial
    /// tree.
    async fn extract(&self, package: &PackageId, destination: &Path) -> Result<()>;
}
