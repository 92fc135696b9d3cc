use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use log::{debug, info};
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::{Registry, RegistryManifest, tarball};
use crate::error::{InstallError, RegistryError};
use crate::http::HttpClient;
use crate::package::PackageId;
use crate::runtime::Runtime;

/// Registry speaking the npm registry protocol.
pub struct NpmRegistry<R: Runtime> {
    runtime: Arc<R>,
    base_url: Url,
    http: HttpClient,
}

/// Document listing every published version of a package.
#[derive(Deserialize, Debug)]
struct Packument {
    #[serde(default)]
    versions: BTreeMap<String, serde_json::Value>,
}

impl<R: Runtime> NpmRegistry<R> {
    pub fn new(base_url: &str, http: HttpClient, runtime: Arc<R>) -> Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }

        let parsed = Url::parse(&normalized).map_err(|e| {
            InstallError::Configuration(format!("Invalid registry URL '{}': {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(InstallError::Configuration(format!(
                "Registry URL '{}' must be an http(s) URL",
                base_url
            ))
            .into());
        }

        Ok(Self {
            runtime,
            base_url: parsed,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<base>/<name>`, with the scope separator encoded (`@scope%2Fname`).
    fn packument_url(&self, name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                InstallError::Configuration(format!(
                    "Registry URL '{}' cannot carry a package path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    async fn fetch_packument(&self, name: &str) -> Result<Packument> {
        let url = self.packument_url(name)?;
        self.http
            .get_json(url.as_str())
            .await
            .with_context(|| format!("Failed to fetch registry metadata for '{}'", name))
    }
}

#[async_trait]
impl<R: Runtime + 'static> Registry for NpmRegistry<R> {
    #[tracing::instrument(skip(self))]
    async fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        let packument = self.fetch_packument(name).await?;
        Ok(packument.versions.into_keys().collect())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_manifest(&self, package: &PackageId) -> Result<RegistryManifest> {
        let mut packument = self.fetch_packument(package.name()).await?;
        let raw = packument
            .versions
            .remove(package.version())
            .ok_or_else(|| RegistryError::VersionNotFound {
                name: package.name().to_string(),
                version: package.version().to_string(),
            })?;

        serde_json::from_value(raw)
            .with_context(|| format!("Failed to parse registry metadata for {}", package))
    }

    #[tracing::instrument(skip(self))]
    async fn extract(&self, package: &PackageId, destination: &Path) -> Result<()> {
        let manifest = self.fetch_manifest(package).await?;
        let dist = manifest.dist.ok_or_else(|| RegistryError::InvalidTarball {
            package: package.to_string(),
            reason: "registry metadata has no dist.tarball".to_string(),
        })?;

        info!("Downloading {} from {}", package, dist.tarball);
        let bytes = self.http.download_bytes(&dist.tarball).await?;

        match dist.integrity.as_deref() {
            Some(integrity) => verify_integrity(package, integrity, &bytes)?,
            None => debug!("No integrity published for {}, skipping check", package),
        }

        let runtime = Arc::clone(&self.runtime);
        let dest = destination.to_path_buf();
        let label = package.to_string();
        tokio::task::spawn_blocking(move || {
            tarball::unpack(runtime.as_ref(), &bytes, &dest, &label)
        })
        .await
        .context("Tarball extraction task failed")?
    }
}

/// Check `bytes` against the sha512 entry of a subresource-integrity string.
/// Strings without a sha512 entry are accepted unchecked.
fn verify_integrity(package: &PackageId, integrity: &str, bytes: &[u8]) -> Result<()> {
    let Some(expected) = integrity
        .split_whitespace()
        .find_map(|hash| hash.strip_prefix("sha512-"))
        .map(|digest| digest.split('?').next().unwrap_or(digest))
    else {
        debug!(
            "No sha512 digest in '{}' for {}, skipping check",
            integrity, package
        );
        return Ok(());
    };

    let actual = BASE64_STANDARD.encode(Sha512::digest(bytes));
    if actual != expected {
        return Err(RegistryError::Integrity {
            package: package.to_string(),
            expected: format!("sha512-{}", expected),
            actual: format!("sha512-{}", actual),
        }
        .into());
    }
    debug!("Integrity of {} verified", package);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::NonRetryableError;
    use crate::runtime::RealRuntime;
    use crate::test_utils::{build_tgz, sri_sha512};
    use reqwest::Client;
    use tempfile::tempdir;

    fn registry(url: &str) -> NpmRegistry<RealRuntime> {
        NpmRegistry::new(url, HttpClient::new(Client::new()), Arc::new(RealRuntime)).unwrap()
    }

    fn packument_body(server_url: &str, integrity: Option<&str>) -> String {
        let integrity = integrity
            .map(|i| format!(r#", "integrity": "{}""#, i))
            .unwrap_or_default();
        format!(
            r#"{{
                "name": "sample-lib",
                "versions": {{
                    "1.2.3": {{
                        "name": "sample-lib",
                        "version": "1.2.3",
                        "dependencies": {{ "left-pad": "^1.3.0" }},
                        "dist": {{
                            "tarball": "{url}/sample-lib/-/sample-lib-1.2.3.tgz"{integrity}
                        }}
                    }},
                    "1.10.0": {{ "name": "sample-lib", "version": "1.10.0" }},
                    "0.9.0": {{ "name": "sample-lib", "version": "0.9.0" }}
                }}
            }}"#,
            url = server_url,
            integrity = integrity
        )
    }

    #[test]
    fn test_new_normalizes_trailing_slash() {
        let registry = registry("https://registry.example.com/npm");
        assert_eq!(
            registry.base_url().as_str(),
            "https://registry.example.com/npm/"
        );
    }

    #[test]
    fn test_new_rejects_invalid_urls() {
        for url in ["not a url", "ftp://registry.example.com/", "mailto:a@b.c"] {
            let err = NpmRegistry::new(url, HttpClient::new(Client::new()), Arc::new(RealRuntime))
                .err()
                .unwrap();
            assert!(
                matches!(
                    err.downcast_ref::<InstallError>(),
                    Some(InstallError::Configuration(_))
                ),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_packument_url_encodes_scope_separator() {
        let registry = registry("https://registry.example.com/npm/");
        assert_eq!(
            registry.packument_url("@scope/widget").unwrap().as_str(),
            "https://registry.example.com/npm/@scope%2Fwidget"
        );
        assert_eq!(
            registry.packument_url("sample-lib").unwrap().as_str(),
            "https://registry.example.com/npm/sample-lib"
        );
    }

    #[tokio::test]
    async fn test_list_versions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sample-lib")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(packument_body(&server.url(), None))
            .create_async()
            .await;

        let versions = registry(&server.url())
            .list_versions("sample-lib")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(versions, vec!["0.9.0", "1.10.0", "1.2.3"]);
    }

    #[tokio::test]
    async fn test_list_versions_scoped_package() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/@scope%2Fwidget")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "@scope/widget", "versions": {"2.0.0": {}}}"#)
            .create_async()
            .await;

        let versions = registry(&server.url())
            .list_versions("@scope/widget")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(versions, vec!["2.0.0"]);
    }

    #[tokio::test]
    async fn test_fetch_manifest() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/sample-lib")
            .with_status(200)
            .with_body(packument_body(&server.url(), None))
            .create_async()
            .await;

        let id = PackageId::new("sample-lib", "1.2.3").unwrap();
        let manifest = registry(&server.url()).fetch_manifest(&id).await.unwrap();

        assert_eq!(manifest.version, "1.2.3");
        assert_eq!(manifest.dependencies["left-pad"], "^1.3.0");
        assert!(manifest.dist.unwrap().tarball.ends_with("sample-lib-1.2.3.tgz"));
    }

    #[tokio::test]
    async fn test_fetch_manifest_unknown_version() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/sample-lib")
            .with_status(200)
            .with_body(packument_body(&server.url(), None))
            .create_async()
            .await;

        let id = PackageId::new("sample-lib", "9.9.9").unwrap();
        let err = registry(&server.url())
            .fetch_manifest(&id)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::VersionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_manifest_unknown_package() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/nope")
            .with_status(404)
            .create_async()
            .await;

        let id = PackageId::new("nope", "1.0.0").unwrap();
        let err = registry(&server.url())
            .fetch_manifest(&id)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<NonRetryableError>(),
            Some(NonRetryableError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_verifies_and_unpacks() {
        let tgz = build_tgz(&[
            ("package/package.json", br#"{"name":"sample-lib"}"#.as_slice()),
            ("package/index.js", b"module.exports = 42;".as_slice()),
        ]);
        let mut server = mockito::Server::new_async().await;
        let _packument = server
            .mock("GET", "/sample-lib")
            .with_status(200)
            .with_body(packument_body(&server.url(), Some(&sri_sha512(&tgz))))
            .create_async()
            .await;
        let tarball = server
            .mock("GET", "/sample-lib/-/sample-lib-1.2.3.tgz")
            .with_status(200)
            .with_body(tgz)
            .expect(1)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("staging").join("sample-lib-1.2.3");
        let id = PackageId::new("sample-lib", "1.2.3").unwrap();
        registry(&server.url()).extract(&id, &dest).await.unwrap();

        tarball.assert_async().await;
        assert!(dest.join("package.json").is_file());
        assert!(dest.join("index.js").is_file());
    }

    #[tokio::test]
    async fn test_extract_rejects_integrity_mismatch() {
        let tgz = build_tgz(&[("package/package.json", b"{}".as_slice())]);
        let other = build_tgz(&[("package/package.json", b"{\"x\":1}".as_slice())]);
        let mut server = mockito::Server::new_async().await;
        let _packument = server
            .mock("GET", "/sample-lib")
            .with_status(200)
            .with_body(packument_body(&server.url(), Some(&sri_sha512(&other))))
            .create_async()
            .await;
        let _tarball = server
            .mock("GET", "/sample-lib/-/sample-lib-1.2.3.tgz")
            .with_status(200)
            .with_body(tgz)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let id = PackageId::new("sample-lib", "1.2.3").unwrap();
        let err = registry(&server.url())
            .extract(&id, &dest)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::Integrity { .. })
        ));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_extract_without_dist() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/sample-lib")
            .with_status(200)
            .with_body(packument_body(&server.url(), None))
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let id = PackageId::new("sample-lib", "0.9.0").unwrap();
        let err = registry(&server.url())
            .extract(&id, &dir.path().join("out"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::InvalidTarball { .. })
        ));
    }

    #[test]
    fn test_verify_integrity_variants() {
        let id = PackageId::new("sample-lib", "1.2.3").unwrap();
        let bytes = b"tarball bytes";
        let good = sri_sha512(bytes);

        assert!(verify_integrity(&id, &good, bytes).is_ok());
        assert!(verify_integrity(&id, &format!("sha1-abc {}", good), bytes).is_ok());
        // Only sha1 published: nothing to check against
        assert!(verify_integrity(&id, "sha1-abc", bytes).is_ok());
        assert!(verify_integrity(&id, &good, b"tampered").is_err());
    }
}
