//! Item installation
//!
//! Archives are fetched into a staging directory inside the items
//! directory, checked, and only then swapped into place. An install either
//! fully replaces the item directory or leaves it untouched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::ContentLayout;
use crate::item::ItemKind;
use crate::manifest::{ItemManifest, MANIFEST_FILE};
use crate::repository::DownloadLocation;

/// Prefix of staging directories; the registry skips hidden directories
const STAGING_PREFIX: &str = ".staging-";

/// An extracted archive waiting to be installed
#[derive(Debug)]
pub struct StagedItem {
    pub manifest: ItemManifest,
    /// Extracted item directory (inside `_staging`)
    pub dir: PathBuf,
    _staging: TempDir,
}

impl StagedItem {
    pub fn slug(&self) -> &str {
        self.manifest.slug()
    }
}

/// Fetches, installs and removes item payloads
#[async_trait]
pub trait Installer: Send + Sync {
    /// Download (or read) and extract an archive into a staging area
    async fn fetch(
        &self,
        kind: ItemKind,
        location: &DownloadLocation,
        digest: Option<&str>,
    ) -> Result<StagedItem>;

    /// Move a staged item into place, replacing any existing version
    fn install(&self, kind: ItemKind, staged: StagedItem) -> Result<PathBuf>;

    /// Remove an installed item
    fn remove(&self, kind: ItemKind, slug: &str) -> Result<()>;
}

/// Installer for `.tar.gz` archives
pub struct ArchiveInstaller {
    #[cfg(feature = "remote")]
    client: reqwest::Client,
    layout: ContentLayout,
}

impl ArchiveInstaller {
    /// Create an installer writing under `layout`
    pub fn new(layout: ContentLayout) -> Result<Self> {
        #[cfg(feature = "remote")]
        let client = reqwest::Client::builder()
            .user_agent(concat!("trove/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            #[cfg(feature = "remote")]
            client,
            layout,
        })
    }

    /// Read archive bytes from a URL or local path
    async fn read_archive(&self, location: &DownloadLocation) -> Result<Vec<u8>> {
        match location {
            DownloadLocation::Path(path) => std::fs::read(path)
                .with_context(|| format!("Failed to read archive: {}", path.display())),
            DownloadLocation::Url(url) => self.download(url).await,
        }
    }

    #[cfg(feature = "remote")]
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed: HTTP {} for {}", response.status(), url);
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read download response")?;

        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "remote"))]
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        anyhow::bail!("Cannot download {url}: remote feature is not enabled. Rebuild with --features remote")
    }

    /// Extract archive bytes into a fresh staging directory and load the manifest
    fn stage(&self, kind: ItemKind, bytes: &[u8]) -> Result<StagedItem> {
        let items_dir = self.layout.items_dir(kind);
        std::fs::create_dir_all(&items_dir)
            .with_context(|| format!("Failed to create {}", items_dir.display()))?;

        // Staging lives next to the final location so the swap is a rename
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&items_dir)
            .context("Failed to create staging directory")?;

        extract_to_dir(bytes, staging.path())?;

        // The item is the first directory in the archive
        let item_dir = std::fs::read_dir(staging.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.is_dir() && p.join(MANIFEST_FILE).is_file())
            .with_context(|| format!("No directory with {MANIFEST_FILE} found in archive"))?;

        let manifest = ItemManifest::from_dir(&item_dir)?;
        manifest.validate(kind)?;

        Ok(StagedItem {
            manifest,
            dir: item_dir,
            _staging: staging,
        })
    }
}

#[async_trait]
impl Installer for ArchiveInstaller {
    async fn fetch(
        &self,
        kind: ItemKind,
        location: &DownloadLocation,
        digest: Option<&str>,
    ) -> Result<StagedItem> {
        let bytes = self.read_archive(location).await?;

        if let Some(expected) = digest {
            verify_digest(&bytes, expected)?;
            tracing::debug!("Verified digest: {}", expected);
        }

        self.stage(kind, &bytes)
    }

    fn install(&self, kind: ItemKind, staged: StagedItem) -> Result<PathBuf> {
        let slug = staged.slug().to_string();
        let install_dir = self.layout.item_dir(kind, &slug);
        let backup_dir = self
            .layout
            .items_dir(kind)
            .join(format!(".{slug}.previous"));

        if backup_dir.exists() {
            std::fs::remove_dir_all(&backup_dir)?;
        }

        let had_previous = install_dir.exists();
        if had_previous {
            std::fs::rename(&install_dir, &backup_dir).with_context(|| {
                format!("Failed to move aside {}", install_dir.display())
            })?;
        }

        if let Err(e) = std::fs::rename(&staged.dir, &install_dir) {
            if had_previous {
                if let Err(restore) = std::fs::rename(&backup_dir, &install_dir) {
                    tracing::error!(
                        "Failed to restore {} after a failed install: {}",
                        install_dir.display(),
                        restore
                    );
                }
            }
            return Err(e)
                .with_context(|| format!("Failed to move {slug} into {}", install_dir.display()));
        }

        if had_previous {
            if let Err(e) = std::fs::remove_dir_all(&backup_dir) {
                tracing::warn!("Failed to clean up {}: {}", backup_dir.display(), e);
            }
        }

        tracing::debug!("Installed {} {} to {:?}", kind, slug, install_dir);
        Ok(install_dir)
    }

    fn remove(&self, kind: ItemKind, slug: &str) -> Result<()> {
        let install_dir = self.layout.item_dir(kind, slug);

        if !install_dir.exists() {
            anyhow::bail!("{} '{}' is not installed", kind.title(), slug);
        }

        std::fs::remove_dir_all(&install_dir)
            .with_context(|| format!("Failed to remove {}", install_dir.display()))?;

        tracing::debug!("Removed {} {}", kind, slug);
        Ok(())
    }
}

/// Verify the SHA-256 digest (`sha256:<hex>`) of downloaded content
pub fn verify_digest(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = format!("sha256:{}", hex::encode(Sha256::digest(bytes)));

    if !actual.eq_ignore_ascii_case(expected) {
        anyhow::bail!(
            "Digest verification failed!\nExpected: {}\nActual: {}",
            expected,
            actual
        );
    }

    Ok(())
}

/// Extract tarball bytes to a directory
fn extract_to_dir(bytes: &[u8], dest: &Path) -> Result<()> {
    let cursor = Cursor::new(bytes);
    let gz_decoder = flate2::read::GzDecoder::new(cursor);
    let mut archive = tar::Archive::new(gz_decoder);

    archive.unpack(dest).context("Failed to extract archive")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::Builder;

    /// Create a test tarball with a manifest
    fn create_test_tarball(kind: &str, name: &str, version: &str) -> Vec<u8> {
        let temp_dir = TempDir::new().unwrap();
        let item_dir = temp_dir.path().join(name);
        std::fs::create_dir_all(&item_dir).unwrap();

        let manifest = format!(
            "apiVersion: trove.dev/v1\nkind: {kind}\nmetadata:\n  name: {name}\n  version: \"{version}\"\n"
        );
        std::fs::write(item_dir.join(MANIFEST_FILE), manifest).unwrap();
        std::fs::write(item_dir.join("index.php"), "<?php // Silence is golden.").unwrap();

        let mut bytes = Vec::new();
        {
            let encoder = GzEncoder::new(&mut bytes, Compression::default());
            let mut builder = Builder::new(encoder);
            builder.append_dir_all(name, &item_dir).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        bytes
    }

    fn write_archive(dir: &Path, bytes: &[u8]) -> DownloadLocation {
        let path = dir.join("archive.tar.gz");
        std::fs::write(&path, bytes).unwrap();
        DownloadLocation::Path(path)
    }

    #[tokio::test]
    async fn test_fetch_and_install() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ContentLayout::new(temp_dir.path().join("content"));
        let installer = ArchiveInstaller::new(layout.clone()).unwrap();

        let location = write_archive(
            temp_dir.path(),
            &create_test_tarball("Theme", "twentyten", "1.0"),
        );
        let staged = installer
            .fetch(ItemKind::Theme, &location, None)
            .await
            .unwrap();
        assert_eq!(staged.slug(), "twentyten");

        // Nothing is visible before install
        assert!(!layout.item_dir(ItemKind::Theme, "twentyten").exists());

        let install_dir = installer.install(ItemKind::Theme, staged).unwrap();
        assert_eq!(install_dir, layout.item_dir(ItemKind::Theme, "twentyten"));
        assert!(install_dir.join(MANIFEST_FILE).exists());

        // Staging directory is gone
        let leftovers: Vec<_> = std::fs::read_dir(layout.items_dir(ItemKind::Theme))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_install_replaces_previous_version() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ContentLayout::new(temp_dir.path().join("content"));
        let installer = ArchiveInstaller::new(layout.clone()).unwrap();

        for version in ["1.0", "1.1"] {
            let location = write_archive(
                temp_dir.path(),
                &create_test_tarball("Plugin", "akismet", version),
            );
            let staged = installer
                .fetch(ItemKind::Plugin, &location, None)
                .await
                .unwrap();
            installer.install(ItemKind::Plugin, staged).unwrap();
        }

        let manifest = ItemManifest::from_dir(&layout.item_dir(ItemKind::Plugin, "akismet")).unwrap();
        assert_eq!(manifest.metadata.version.as_str(), "1.1");
    }

    #[tokio::test]
    async fn test_fetch_rejects_wrong_kind_and_digest() {
        let temp_dir = TempDir::new().unwrap();
        let installer =
            ArchiveInstaller::new(ContentLayout::new(temp_dir.path().join("content"))).unwrap();
        let tarball = create_test_tarball("Plugin", "akismet", "1.0");
        let location = write_archive(temp_dir.path(), &tarball);

        let err = installer
            .fetch(ItemKind::Theme, &location, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid kind"));

        let err = installer
            .fetch(ItemKind::Plugin, &location, Some("sha256:wrong"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Digest verification failed"));

        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&tarball)));
        assert!(installer
            .fetch(ItemKind::Plugin, &location, Some(&digest))
            .await
            .is_ok());
    }

    #[test]
    fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ContentLayout::new(temp_dir.path());
        let installer = ArchiveInstaller::new(layout.clone()).unwrap();

        let dir = layout.item_dir(ItemKind::Theme, "twentyten");
        std::fs::create_dir_all(&dir).unwrap();

        installer.remove(ItemKind::Theme, "twentyten").unwrap();
        assert!(!dir.exists());

        let err = installer.remove(ItemKind::Theme, "twentyten").unwrap_err();
        assert!(err.to_string().contains("not installed"));
    }
}
