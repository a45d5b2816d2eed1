//! Item model: kinds, installed items, update candidates and install requests

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::version::Version;

/// The kinds of item trove manages
///
/// Each kind has its own directory under the content root, its own
/// repository index and its own single active slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Theme,
    Plugin,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Theme, ItemKind::Plugin];

    /// Lowercase singular label ("theme")
    pub fn label(self) -> &'static str {
        match self {
            ItemKind::Theme => "theme",
            ItemKind::Plugin => "plugin",
        }
    }

    /// Capitalized label for sentence starts ("Theme")
    pub fn title(self) -> &'static str {
        match self {
            ItemKind::Theme => "Theme",
            ItemKind::Plugin => "Plugin",
        }
    }

    /// Directory name under the content root, also used for the repository index path
    pub fn dir_name(self) -> &'static str {
        match self {
            ItemKind::Theme => "themes",
            ItemKind::Plugin => "plugins",
        }
    }

    /// The `kind` value expected in this kind's manifests
    pub fn manifest_kind(self) -> &'static str {
        self.title()
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether an installed item is the active one for its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Inactive,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Inactive => "inactive",
        }
    }

    /// Capitalized form used in the single-item status block
    pub fn long(self) -> &'static str {
        match self {
            ItemStatus::Active => "Active",
            ItemStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An installed item as seen by the registry
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub slug: String,
    pub display_name: String,
    pub installed_version: Version,
    pub is_active: bool,
    /// Latest version advertised by the repository, when it was consulted
    pub available_version: Option<Version>,
    /// Install directory
    pub source_location: PathBuf,
    pub author: Option<String>,
    pub description: Option<String>,
}

impl Item {
    pub fn status(&self) -> ItemStatus {
        if self.is_active {
            ItemStatus::Active
        } else {
            ItemStatus::Inactive
        }
    }

    /// Path of the item's primary definition file
    pub fn definition_file(&self) -> PathBuf {
        self.source_location.join(crate::manifest::MANIFEST_FILE)
    }
}

/// An installed item paired with a newer repository version
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCandidate {
    pub item: Item,
    pub version: Version,
}

/// Where an install takes its payload from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSource {
    /// A slug known to the repository
    Slug(String),
    /// A local `.tar.gz` archive
    ArchivePath(PathBuf),
    /// A direct download URL
    Url(String),
}

impl InstallSource {
    /// Classify a CLI argument
    ///
    /// `http://`/`https://` is a URL; an existing file or a `.tar.gz`/`.tgz`
    /// path is an archive; anything else is a repository slug.
    pub fn parse(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            return InstallSource::Url(arg.to_string());
        }

        let path = Path::new(arg);
        if path.is_file() || arg.ends_with(".tar.gz") || arg.ends_with(".tgz") {
            return InstallSource::ArchivePath(path.to_path_buf());
        }

        InstallSource::Slug(arg.to_string())
    }

    pub fn describe(&self) -> String {
        match self {
            InstallSource::Slug(slug) => slug.clone(),
            InstallSource::ArchivePath(path) => path.display().to_string(),
            InstallSource::Url(url) => url.clone(),
        }
    }
}

/// A request to install (or reinstall, or update) a single item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub source: InstallSource,
    pub requested_version: Option<String>,
    pub activate_after_install: bool,
    pub confirm_overwrite: bool,
}

impl InstallRequest {
    pub fn new(source: InstallSource) -> Self {
        Self {
            source,
            requested_version: None,
            activate_after_install: false,
            confirm_overwrite: false,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.requested_version = version;
        self
    }

    pub fn activate(mut self, activate: bool) -> Self {
        self.activate_after_install = activate;
        self
    }

    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.confirm_overwrite = yes;
        self
    }
}
