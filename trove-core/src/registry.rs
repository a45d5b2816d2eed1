//! Installed-item registry
//!
//! A read-only snapshot of the items directory for one kind: every
//! `<items_dir>/<slug>/manifest.yaml` becomes an [`Item`]. The snapshot is
//! cheap to rebuild and is rebuilt after every mutation.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::LifecycleError;
use crate::item::{Item, ItemKind, ItemStatus, UpdateCandidate};
use crate::manifest::{ItemManifest, MANIFEST_FILE};
use crate::version::Version;

/// Snapshot of the installed items of one kind
#[derive(Debug, Clone)]
pub struct ItemRegistry {
    kind: ItemKind,
    active_path: Option<PathBuf>,
    items: BTreeMap<String, Item>,
}

impl ItemRegistry {
    /// Scan `items_dir`; `active_path` is the install path of the active item
    pub fn scan(
        kind: ItemKind,
        items_dir: &Path,
        active_path: Option<PathBuf>,
    ) -> Result<Self, LifecycleError> {
        let mut items = BTreeMap::new();

        if items_dir.exists() {
            let entries = std::fs::read_dir(items_dir).map_err(|e| LifecycleError::State {
                kind,
                source: Box::new(e),
            })?;

            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                let Some(dir_name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };

                // Staging and backup directories are hidden
                if dir_name.starts_with('.') || !path.is_dir() {
                    continue;
                }

                if !path.join(MANIFEST_FILE).is_file() {
                    continue;
                }

                let manifest = match ItemManifest::from_dir(&path) {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {:#}", path.display(), e);
                        continue;
                    }
                };

                let is_active = active_path.as_deref() == Some(path.as_path());
                items.insert(
                    dir_name.clone(),
                    Item {
                        kind,
                        slug: dir_name,
                        display_name: manifest.display_name().to_string(),
                        installed_version: manifest.metadata.version.clone(),
                        is_active,
                        available_version: None,
                        source_location: path,
                        author: manifest.metadata.author.clone(),
                        description: manifest.metadata.description.clone(),
                    },
                );
            }
        }

        Ok(Self {
            kind,
            active_path,
            items,
        })
    }

    /// Attach repository-advertised versions, keyed by slug
    pub fn with_available_versions(mut self, available: HashMap<String, Version>) -> Self {
        for (slug, version) in available {
            if let Some(item) = self.items.get_mut(&slug) {
                item.available_version = Some(version);
            }
        }
        self
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Every installed item, ordered by slug
    pub fn list_all(&self) -> Vec<Item> {
        self.items.values().cloned().collect()
    }

    /// Exact-match lookup
    pub fn find(&self, slug: &str) -> Result<Item, LifecycleError> {
        self.items
            .get(slug)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound {
                kind: self.kind,
                slug: slug.to_string(),
            })
    }

    /// Active iff the item's install path is the active path for its kind
    pub fn status(&self, item: &Item) -> ItemStatus {
        if self.active_path.as_deref() == Some(item.source_location.as_path()) {
            ItemStatus::Active
        } else {
            ItemStatus::Inactive
        }
    }

    /// The update candidate for `item`, if the repository has something newer
    pub fn update_candidate(&self, item: &Item) -> Option<UpdateCandidate> {
        let available = item.available_version.as_ref()?;
        (*available > item.installed_version).then(|| UpdateCandidate {
            item: item.clone(),
            version: available.clone(),
        })
    }

    pub fn has_update(&self, item: &Item) -> bool {
        self.update_candidate(item).is_some()
    }

    /// All update candidates, ordered by slug
    pub fn update_candidates(&self) -> Vec<UpdateCandidate> {
        self.items
            .values()
            .filter_map(|item| self.update_candidate(item))
            .collect()
    }

    /// The active item, if it is installed
    pub fn active(&self) -> Option<Item> {
        self.items.values().find(|item| item.is_active).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_item(items_dir: &Path, slug: &str, version: &str) -> PathBuf {
        let dir = items_dir.join(slug);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                "apiVersion: trove.dev/v1\nkind: Theme\nmetadata:\n  name: {slug}\n  version: \"{version}\"\n"
            ),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_scan_lists_items_in_slug_order() {
        let temp_dir = TempDir::new().unwrap();
        write_item(temp_dir.path(), "twentyten", "1.0");
        write_item(temp_dir.path(), "minimal", "0.5");
        std::fs::create_dir_all(temp_dir.path().join(".staging-abc")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("no-manifest")).unwrap();

        let registry = ItemRegistry::scan(ItemKind::Theme, temp_dir.path(), None).unwrap();
        let slugs: Vec<String> = registry.list_all().into_iter().map(|i| i.slug).collect();
        assert_eq!(slugs, vec!["minimal", "twentyten"]);
    }

    #[test]
    fn test_missing_items_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let registry =
            ItemRegistry::scan(ItemKind::Plugin, &temp_dir.path().join("plugins"), None).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_and_status() {
        let temp_dir = TempDir::new().unwrap();
        let active = write_item(temp_dir.path(), "twentyten", "1.0");
        write_item(temp_dir.path(), "minimal", "0.5");

        let registry = ItemRegistry::scan(ItemKind::Theme, temp_dir.path(), Some(active)).unwrap();

        let item = registry.find("twentyten").unwrap();
        assert!(item.is_active);
        assert_eq!(registry.status(&item), ItemStatus::Active);

        let other = registry.find("minimal").unwrap();
        assert_eq!(registry.status(&other), ItemStatus::Inactive);
        assert_eq!(registry.active().unwrap().slug, "twentyten");

        let err = registry.find("missing").unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));
    }

    #[test]
    fn test_update_candidates() {
        let temp_dir = TempDir::new().unwrap();
        write_item(temp_dir.path(), "twentyten", "1.0");
        write_item(temp_dir.path(), "minimal", "0.5");

        let available = HashMap::from([
            ("twentyten".to_string(), Version::new("1.1")),
            ("minimal".to_string(), Version::new("0.5.0")),
            ("unknown".to_string(), Version::new("9.9")),
        ]);
        let registry = ItemRegistry::scan(ItemKind::Theme, temp_dir.path(), None)
            .unwrap()
            .with_available_versions(available);

        assert!(registry.has_update(&registry.find("twentyten").unwrap()));
        assert!(!registry.has_update(&registry.find("minimal").unwrap()));

        let candidates = registry.update_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].version, Version::new("1.1"));
    }
}
