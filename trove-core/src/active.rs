//! Active item tracking (`<root>/active.yaml`)
//!
//! Records which item of each kind is currently in effect. At most one item
//! per kind is active.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ContentLayout;
use crate::item::ItemKind;

/// Switches and reports the active item of a kind
pub trait ActiveItemSwitch: Send + Sync {
    /// Make `slug` the active item of `kind`
    fn set_active(&self, kind: ItemKind, slug: &str) -> Result<()>;

    /// Install path of the active item of `kind`, if any
    fn active_path(&self, kind: ItemKind) -> Result<Option<PathBuf>>;
}

/// Contents of the active-state file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveState {
    /// API version for schema compatibility
    pub api_version: String,
    /// When this file was last written
    pub generated: String,
    /// Active slug per kind
    #[serde(default)]
    pub active: BTreeMap<ItemKind, String>,
}

impl Default for ActiveState {
    fn default() -> Self {
        Self {
            api_version: crate::manifest::API_VERSION.to_string(),
            generated: chrono::Utc::now().to_rfc3339(),
            active: BTreeMap::new(),
        }
    }
}

impl ActiveState {
    /// Load the state file or return default if not found
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Save the state file, creating the content root if needed
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut state = self.clone();
        state.generated = chrono::Utc::now().to_rfc3339();

        let content = serde_yaml_ng::to_string(&state)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    pub fn get(&self, kind: ItemKind) -> Option<&str> {
        self.active.get(&kind).map(String::as_str)
    }

    pub fn set(&mut self, kind: ItemKind, slug: &str) {
        self.active.insert(kind, slug.to_string());
    }
}

/// [`ActiveItemSwitch`] backed by `active.yaml` under the content root
#[derive(Debug, Clone)]
pub struct FileActiveSwitch {
    layout: ContentLayout,
}

impl FileActiveSwitch {
    pub fn new(layout: ContentLayout) -> Self {
        Self { layout }
    }

    pub fn load(&self) -> Result<ActiveState> {
        ActiveState::load_from_path(&self.layout.active_state_file())
    }
}

impl ActiveItemSwitch for FileActiveSwitch {
    fn set_active(&self, kind: ItemKind, slug: &str) -> Result<()> {
        let mut state = self.load()?;
        state.set(kind, slug);
        state.save_to_path(&self.layout.active_state_file())?;

        tracing::debug!("Active {} is now '{}'", kind, slug);
        Ok(())
    }

    fn active_path(&self, kind: ItemKind) -> Result<Option<PathBuf>> {
        let state = self.load()?;
        Ok(state.get(kind).map(|slug| self.layout.item_dir(kind, slug)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_state() {
        let state = ActiveState::default();
        assert_eq!(state.api_version, "trove.dev/v1");
        assert!(state.active.is_empty());
    }

    #[test]
    fn test_switch_replaces_previous() {
        let temp_dir = TempDir::new().unwrap();
        let switch = FileActiveSwitch::new(ContentLayout::new(temp_dir.path()));

        assert_eq!(switch.active_path(ItemKind::Theme).unwrap(), None);

        switch.set_active(ItemKind::Theme, "twentyten").unwrap();
        switch.set_active(ItemKind::Theme, "twentyeleven").unwrap();
        switch.set_active(ItemKind::Plugin, "akismet").unwrap();

        assert_eq!(
            switch.active_path(ItemKind::Theme).unwrap(),
            Some(temp_dir.path().join("themes").join("twentyeleven"))
        );
        assert_eq!(
            switch.active_path(ItemKind::Plugin).unwrap(),
            Some(temp_dir.path().join("plugins").join("akismet"))
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("active.yaml");

        let mut state = ActiveState::default();
        state.set(ItemKind::Theme, "twentyten");
        state.save_to_path(&path).unwrap();

        let loaded = ActiveState::load_from_path(&path).unwrap();
        assert_eq!(loaded.get(ItemKind::Theme), Some("twentyten"));
        assert_eq!(loaded.get(ItemKind::Plugin), None);
    }
}
