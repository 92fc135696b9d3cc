use anyhow::Result;
use std::fmt;
use std::str::FromStr;

use crate::error::InstallError;

/// Package identity: a name and an exact version.
///
/// Names may carry one namespace separator in the scoped form
/// `@scope/name`. Everything else that could escape the install root
/// (other separators, `.` or `..` components) is rejected up front, so the
/// paths derived from an identity always stay inside their directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    name: String,
    version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        validate_name(&name).map_err(|reason| {
            InstallError::invalid_package(format!("{}@{}", name, version), reason)
        })?;
        validate_version(&version).map_err(|reason| {
            InstallError::invalid_package(format!("{}@{}", name, version), reason)
        })?;
        Ok(Self { name, version })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Scope of a scoped package (`@scope` for `@scope/name`).
    pub fn scope(&self) -> Option<&str> {
        self.name.split_once('/').map(|(scope, _)| scope)
    }

    /// Name segments, one per directory level (`["@scope", "name"]`).
    pub fn name_segments(&self) -> impl Iterator<Item = &str> {
        self.name.split('/')
    }

    /// Name with the namespace separator mapped to `-`, for flat file names.
    pub fn flat_name(&self) -> String {
        self.name.replace('/', "-")
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("package name is empty".to_string());
    }
    if name.contains('\\') {
        return Err("package name contains a path separator".to_string());
    }

    let segments: Vec<&str> = name.split('/').collect();
    match segments.as_slice() {
        [single] => check_segment(single),
        [scope, rest] => {
            if !scope.starts_with('@') || scope.len() < 2 {
                return Err(format!(
                    "only scoped names ('@scope/name') may contain '/', got '{}'",
                    name
                ));
            }
            check_segment(scope)?;
            check_segment(rest)
        }
        _ => Err(format!("package name '{}' has too many '/' separators", name)),
    }
}

fn check_segment(segment: &str) -> Result<(), String> {
    match segment {
        "" => Err("package name has an empty segment".to_string()),
        "." | ".." => Err(format!("'{}' is not a valid name segment", segment)),
        _ => Ok(()),
    }
}

fn validate_version(version: &str) -> Result<(), String> {
    if version.is_empty() {
        return Err("version is empty".to_string());
    }
    if version.contains('/') || version.contains('\\') {
        return Err("version contains a path separator".to_string());
    }
    if version == "." || version == ".." {
        return Err(format!("'{}' is not a valid version", version));
    }
    Ok(())
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl FromStr for PackageId {
    type Err = anyhow::Error;

    /// Parse `name@version`. A leading `@` belongs to a scoped name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = s
            .char_indices()
            .skip(1)
            .filter(|(_, c)| *c == '@')
            .map(|(i, _)| i)
            .last();

        match separator {
            Some(at) => PackageId::new(&s[..at], &s[at + 1..]),
            None => Err(InstallError::invalid_package(s, "expected 'name@version'").into()),
        }
    }
}
