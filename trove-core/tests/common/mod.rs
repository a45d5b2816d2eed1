//! Shared fixtures for lifecycle integration tests
//!
//! Each fixture owns a temp directory holding a content root and a folder
//! of packaged archives that the in-memory repository points at with
//! `file://` URLs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;
use tempfile::TempDir;

use trove_core::installer::StagedItem;
use trove_core::{
    ActiveItemSwitch, ArchiveInstaller, ConfirmationPrompt, ContentLayout, DownloadLocation,
    FileActiveSwitch, IndexEntry, IndexedRepository, Installer, ItemKind, LifecycleController,
    Release, Repository, RepositoryIndex, Version,
};

/// Build a `.tar.gz` holding `<slug>/manifest.yaml`
pub fn create_tarball(kind: ItemKind, slug: &str, version: &str) -> Vec<u8> {
    let temp_dir = TempDir::new().unwrap();
    let item_dir = temp_dir.path().join(slug);
    std::fs::create_dir_all(&item_dir).unwrap();

    let manifest = format!(
        "apiVersion: trove.dev/v1\nkind: {}\nmetadata:\n  name: {slug}\n  displayName: {slug} ({version})\n  version: \"{version}\"\n  author: Trove Tests\n",
        kind.manifest_kind()
    );
    std::fs::write(item_dir.join("manifest.yaml"), manifest).unwrap();
    std::fs::write(item_dir.join("style.css"), format!("/* {slug} {version} */")).unwrap();

    let mut bytes = Vec::new();
    {
        let encoder = GzEncoder::new(&mut bytes, Compression::default());
        let mut builder = Builder::new(encoder);
        builder.append_dir_all(slug, &item_dir).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }
    bytes
}

/// Write an item straight into the content root, bypassing the installer
pub fn write_installed(layout: &ContentLayout, kind: ItemKind, slug: &str, version: &str) {
    let dir = layout.item_dir(kind, slug);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("manifest.yaml"),
        format!(
            "apiVersion: trove.dev/v1\nkind: {}\nmetadata:\n  name: {slug}\n  version: \"{version}\"\n",
            kind.manifest_kind()
        ),
    )
    .unwrap();
}

/// Answers with a fixed value and records every question
#[derive(Debug, Default)]
pub struct RecordingPrompt {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl RecordingPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl ConfirmationPrompt for RecordingPrompt {
    fn ask(&self, message: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.answer)
    }
}

/// Wraps a real installer and fails the final swap or removal on request
pub struct FlakyInstaller {
    pub inner: ArchiveInstaller,
    pub fail_install: bool,
    pub fail_remove: bool,
    pub fetches: Mutex<usize>,
}

#[async_trait::async_trait]
impl Installer for FlakyInstaller {
    async fn fetch(
        &self,
        kind: ItemKind,
        location: &DownloadLocation,
        digest: Option<&str>,
    ) -> Result<StagedItem> {
        *self.fetches.lock().unwrap() += 1;
        self.inner.fetch(kind, location, digest).await
    }

    fn install(&self, kind: ItemKind, staged: StagedItem) -> Result<PathBuf> {
        if self.fail_install {
            anyhow::bail!("disk full");
        }
        self.inner.install(kind, staged)
    }

    fn remove(&self, kind: ItemKind, slug: &str) -> Result<()> {
        if self.fail_remove {
            anyhow::bail!("permission denied");
        }
        self.inner.remove(kind, slug)
    }
}

/// An active-item switch that accepts every request and changes nothing
pub struct StuckSwitch;

impl ActiveItemSwitch for StuckSwitch {
    fn set_active(&self, _kind: ItemKind, _slug: &str) -> Result<()> {
        Ok(())
    }

    fn active_path(&self, _kind: ItemKind) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// A repository that cannot be reached
pub struct UnreachableRepository;

#[async_trait::async_trait]
impl Repository for UnreachableRepository {
    async fn lookup(&self, _kind: ItemKind, _slug: &str) -> Result<Option<Release>> {
        anyhow::bail!("connection refused")
    }

    async fn lookup_version(
        &self,
        _kind: ItemKind,
        _slug: &str,
        _spec: &str,
    ) -> Result<Option<Release>> {
        anyhow::bail!("connection refused")
    }
}

/// Content root plus a local archive repository
pub struct Fixture {
    pub temp_dir: TempDir,
    pub layout: ContentLayout,
    pub index: RepositoryIndex,
}

impl Fixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let layout = ContentLayout::new(temp_dir.path().join("content"));
        std::fs::create_dir_all(temp_dir.path().join("archives")).unwrap();

        Self {
            temp_dir,
            layout,
            index: RepositoryIndex::new(),
        }
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.temp_dir.path().join("archives")
    }

    /// Package `slug` at `version` and write it as `<slug>.<version>.tar.gz`
    pub fn write_archive(&self, kind: ItemKind, slug: &str, version: &str) -> PathBuf {
        let path = self.archives_dir().join(format!("{slug}.{version}.tar.gz"));
        std::fs::write(&path, create_tarball(kind, slug, version)).unwrap();
        path
    }

    /// Package `slug` at `version` and advertise it in the repository
    pub fn publish(&mut self, kind: ItemKind, slug: &str, version: &str) -> &mut Self {
        let path = self.write_archive(kind, slug, version);
        self.index.insert(IndexEntry {
            name: slug.to_string(),
            display_name: Some(format!("{slug} ({version})")),
            version: Version::new(version),
            description: None,
            digest: None,
            created: None,
            urls: vec![format!("file://{}", path.display())],
        });
        self
    }

    pub fn install_local(&self, kind: ItemKind, slug: &str, version: &str) {
        write_installed(&self.layout, kind, slug, version);
    }

    pub fn repository(&self, kind: ItemKind) -> Arc<dyn Repository> {
        Arc::new(IndexedRepository::new().with_index(kind, self.index.clone()))
    }

    pub fn installer(&self) -> ArchiveInstaller {
        ArchiveInstaller::new(self.layout.clone()).unwrap()
    }

    pub fn switch(&self) -> Arc<dyn ActiveItemSwitch> {
        Arc::new(FileActiveSwitch::new(self.layout.clone()))
    }

    /// Controller over the real installer and switch
    pub fn controller(&self, kind: ItemKind, prompt: Arc<dyn ConfirmationPrompt>) -> LifecycleController {
        LifecycleController::new(
            kind,
            self.layout.clone(),
            self.repository(kind),
            Arc::new(self.installer()),
            self.switch(),
            prompt,
        )
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }
}
