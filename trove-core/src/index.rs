//! Repository index parsing and version resolution
//!
//! Each kind has an `index.yaml` listing every item the repository offers,
//! with all published versions and their download locations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::version::{Version, VersionSpec};

/// A repository index (index.yaml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// API version
    pub api_version: String,

    /// Kind (RepositoryIndex)
    pub kind: String,

    /// When the index was generated
    pub generated: String,

    /// All entries, keyed by slug
    pub entries: HashMap<String, Vec<IndexEntry>>,
}

/// An entry for a specific item version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Slug
    pub name: String,

    /// Human-readable name
    #[serde(default)]
    pub display_name: Option<String>,

    pub version: Version,

    #[serde(default)]
    pub description: Option<String>,

    /// SHA-256 digest of the archive (`sha256:<hex>`)
    #[serde(default)]
    pub digest: Option<String>,

    /// When this version was published
    #[serde(default)]
    pub created: Option<String>,

    /// Download URLs for the archive
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self {
            api_version: crate::manifest::API_VERSION.to_string(),
            kind: "RepositoryIndex".to_string(),
            generated: chrono::Utc::now().to_rfc3339(),
            entries: HashMap::new(),
        }
    }
}

impl RepositoryIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse index from YAML string; versions are ordered newest first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut index: Self =
            serde_yaml_ng::from_str(content).context("Failed to parse repository index YAML")?;
        index.sort_versions();
        Ok(index)
    }

    /// Add a single entry, keeping versions newest first
    pub fn insert(&mut self, entry: IndexEntry) {
        self.entries
            .entry(entry.name.clone())
            .or_default()
            .push(entry);
        self.sort_versions();
    }

    fn sort_versions(&mut self) {
        for versions in self.entries.values_mut() {
            versions.sort_by(|a, b| b.version.cmp(&a.version));
            versions.dedup_by(|a, b| a.version == b.version);
        }
    }

    /// Get all versions of an item, newest first
    pub fn get_versions(&self, slug: &str) -> Option<&Vec<IndexEntry>> {
        self.entries.get(slug)
    }

    /// Get the latest version of an item
    pub fn get_latest(&self, slug: &str) -> Option<&IndexEntry> {
        self.entries.get(slug).and_then(|v| v.first())
    }

    /// Resolve a version specifier to a concrete entry
    ///
    /// Supports exact versions, "" / "latest", caret (`^1.2`) and tilde
    /// (`~1.2`) ranges.
    pub fn resolve_version(&self, slug: &str, specifier: &str) -> Option<&IndexEntry> {
        let versions = self.entries.get(slug)?;
        VersionSpec::parse(specifier).select(versions, |entry| &entry.version)
    }

    /// Get total number of items
    pub fn item_count(&self) -> usize {
        self.entries.len()
    }
}

impl IndexEntry {
    /// Get the first download URL if available
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Derive the entry for an unlisted `version` by rewriting this entry's
    /// versioned download URL (`<slug>.<version>.tar.gz`)
    pub fn at_version(&self, version: &Version) -> Option<IndexEntry> {
        let url = self.download_url()?;
        let current = format!("{}.{}.", self.name, self.version);
        if !url.contains(&current) {
            return None;
        }

        let replacement = format!("{}.{}.", self.name, version);
        Some(IndexEntry {
            version: version.clone(),
            digest: None,
            created: None,
            urls: vec![url.replacen(&current, &replacement, 1)],
            ..self.clone()
        })
    }
}
