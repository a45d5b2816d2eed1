//! Item manifest parsing (manifest.yaml)
//!
//! The manifest is an item's primary definition file. It carries the slug,
//! display name, version and descriptive metadata the registry reports.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::item::ItemKind;
use crate::version::Version;

/// File name of the definition file inside every item directory
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Supported manifest schema version
pub const API_VERSION: &str = "trove.dev/v1";

/// An item manifest (manifest.yaml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemManifest {
    /// API version (must be "trove.dev/v1")
    pub api_version: String,

    /// Kind ("Theme" or "Plugin")
    pub kind: String,

    /// Item metadata
    pub metadata: ManifestMetadata,
}

/// Item metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    /// Slug (lowercase alphanumeric with hyphens)
    pub name: String,

    /// Human-readable name, defaults to the slug
    #[serde(default)]
    pub display_name: Option<String>,

    pub version: Version,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub author: Option<String>,
}

impl ItemManifest {
    /// Load manifest from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    /// Load manifest from an item directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        Self::from_file(&dir.join(MANIFEST_FILE))
    }

    /// Parse manifest from YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Invalid manifest YAML")
    }

    /// Validate the manifest for an item of `kind`
    pub fn validate(&self, kind: ItemKind) -> Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Unsupported apiVersion '{}'. Expected '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != kind.manifest_kind() {
            anyhow::bail!(
                "Invalid kind '{}'. Expected '{}'",
                self.kind,
                kind.manifest_kind()
            );
        }

        validate_slug(&self.metadata.name)?;

        if self.metadata.version.as_str().is_empty() {
            anyhow::bail!("Version is required");
        }

        Ok(())
    }

    pub fn slug(&self) -> &str {
        &self.metadata.name
    }

    pub fn display_name(&self) -> &str {
        self.metadata
            .display_name
            .as_deref()
            .unwrap_or(&self.metadata.name)
    }
}

/// Check that a slug is lowercase alphanumeric with inner hyphens
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        anyhow::bail!("Item name is required");
    }

    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c == '-' || c.is_ascii_digit())
    {
        anyhow::bail!("Item name '{slug}' must be lowercase alphanumeric with hyphens");
    }

    if slug.starts_with('-') || slug.ends_with('-') {
        anyhow::bail!("Item name '{slug}' cannot start or end with a hyphen");
    }

    Ok(())
}
