//! Configuration and content-root layout
//!
//! Configuration is read from `config.yaml` in the platform config
//! directory (or an explicit path). A missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::item::ItemKind;

/// Default content root, relative to the working directory
pub const DEFAULT_ROOT: &str = "content";

/// Default repository base URL
pub const DEFAULT_REPOSITORY_URL: &str = "https://repository.trove.dev";

/// Default index cache TTL (15 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 15 * 60;

/// Name of the active-state file under the content root
pub const ACTIVE_STATE_FILE: &str = "active.yaml";

/// trove configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TroveConfig {
    /// Content root holding `themes/`, `plugins/` and `active.yaml`
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// Repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// Base URL; each kind's index lives at `<url>/<kind-dir>/index.yaml`
    #[serde(default = "default_repository_url")]
    pub url: String,

    /// How long a fetched index stays fresh in the local cache
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

fn default_repository_url() -> String {
    DEFAULT_REPOSITORY_URL.to_string()
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: default_repository_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for TroveConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            repository: RepositoryConfig::default(),
        }
    }
}

impl RepositoryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Index URL for one kind
    pub fn index_url(&self, kind: ItemKind) -> String {
        format!(
            "{}/{}/index.yaml",
            self.url.trim_end_matches('/'),
            kind.dir_name()
        )
    }
}

impl TroveConfig {
    /// Load from the default location, or from `path` when given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => match Self::default_config_path() {
                Some(path) => Self::load_from_path(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Load from a specific path; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Platform config file location
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "trove", "trove")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .or_else(|| dirs::config_dir().map(|d| d.join("trove")))
            .map(|dir| dir.join("config.yaml"))
    }

    /// Platform cache directory for repository indexes
    pub fn cache_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "trove", "trove")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .or_else(|| dirs::cache_dir().map(|d| d.join("trove")))
    }

    pub fn layout(&self) -> ContentLayout {
        ContentLayout::new(self.root.clone())
    }
}

/// Paths under the content root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLayout {
    root: PathBuf,
}

impl ContentLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all items of `kind`
    pub fn items_dir(&self, kind: ItemKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Install directory of one item
    pub fn item_dir(&self, kind: ItemKind, slug: &str) -> PathBuf {
        self.items_dir(kind).join(slug)
    }

    pub fn active_state_file(&self) -> PathBuf {
        self.root.join(ACTIVE_STATE_FILE)
    }
}
