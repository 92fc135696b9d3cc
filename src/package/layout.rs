//! Directory layout of an install root.
//!
//! Every path used by the installer is derived from the install root and a
//! [`PackageId`]; there is no index or database on the side.

use std::path::{Path, PathBuf};

use super::{MANIFEST_FILE, PackageId};

/// Paths under an install root.
///
/// ```text
/// <root>/packages/<namespace>/<name>/<version>/   install target
/// <root>/staging/<name>-<version>/                transient staging area
/// <root>/locks/package-<name>@<version>.lock      transient lock token
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
    packages_dir: PathBuf,
    staging_dir: PathBuf,
    locks_dir: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            packages_dir: root.join("packages"),
            staging_dir: root.join("staging"),
            locks_dir: root.join("locks"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    pub fn locks_dir(&self) -> &Path {
        &self.locks_dir
    }

    /// Returns: `<root>/packages/<namespace>/<name>/<version>`
    pub fn target_dir(&self, package: &PackageId) -> PathBuf {
        let mut dir = self.packages_dir.clone();
        dir.extend(package.name_segments());
        dir.join(package.version())
    }

    /// Returns: `<root>/packages/<namespace>/<name>/<version>/package.json`
    pub fn manifest_path(&self, package: &PackageId) -> PathBuf {
        self.target_dir(package).join(MANIFEST_FILE)
    }

    /// Returns: `<root>/staging/<name>-<version>`
    pub fn staging_dir(&self, package: &PackageId) -> PathBuf {
        self.staging_dir
            .join(format!("{}-{}", package.flat_name(), package.version()))
    }

    /// Returns: `<root>/locks/package-<name>@<version>.lock`
    pub fn lock_path(&self, package: &PackageId) -> PathBuf {
        self.locks_dir.join(format!(
            "package-{}@{}.lock",
            package.flat_name(),
            package.version()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_root;

    fn sample() -> PackageId {
        PackageId::new("sample-lib", "1.2.3").unwrap()
    }

    #[test]
    fn test_layout_paths() {
        let layout = InstallLayout::new(test_root());
        let id = sample();

        assert_eq!(
            layout.target_dir(&id),
            test_root().join("packages").join("sample-lib").join("1.2.3")
        );
        assert_eq!(
            layout.manifest_path(&id),
            test_root()
                .join("packages")
                .join("sample-lib")
                .join("1.2.3")
                .join("package.json")
        );
        assert_eq!(
            layout.staging_dir(&id),
            test_root().join("staging").join("sample-lib-1.2.3")
        );
        assert_eq!(
            layout.lock_path(&id),
            test_root().join("locks").join("package-sample-lib@1.2.3.lock")
        );
    }

    #[test]
    fn test_layout_paths_scoped() {
        let layout = InstallLayout::new(test_root());
        let id = PackageId::new("@ui5/core", "1.120.0").unwrap();

        assert_eq!(
            layout.target_dir(&id),
            test_root()
                .join("packages")
                .join("@ui5")
                .join("core")
                .join("1.120.0")
        );
        assert_eq!(
            layout.staging_dir(&id),
            test_root().join("staging").join("@ui5-core-1.120.0")
        );
        assert_eq!(
            layout.lock_path(&id),
            test_root().join("locks").join("package-@ui5-core@1.120.0.lock")
        );
    }

    #[test]
    fn test_layout_targets_never_nest_in_staging_or_locks() {
        let layout = InstallLayout::new(test_root());
        let id = sample();

        assert!(layout.target_dir(&id).starts_with(layout.packages_dir()));
        assert!(!layout.staging_dir(&id).starts_with(layout.packages_dir()));
        assert!(layout.lock_path(&id).starts_with(layout.locks_dir()));
        assert_eq!(layout.root(), test_root());
    }
}
