//! Trove - theme and plugin lifecycle management
//!
//! Discovers installed items under a content root, resolves versions
//! against a remote repository, and installs, updates, activates and
//! removes items.
//!
//! # Architecture
//!
//! ```text
//! Repository (HTTP)
//!     │
//!     ├── themes/index.yaml    ← Every theme and its versions
//!     ├── plugins/index.yaml   ← Every plugin and its versions
//!     └── **/*.tar.gz          ← Packaged items
//!            │
//!            ▼
//!     LifecycleController      ← One per kind
//!            │
//!            ▼
//!     <root>/themes/<slug>/    ← Installed items (manifest.yaml)
//!     <root>/plugins/<slug>/
//!     <root>/active.yaml       ← Active slug per kind
//! ```

pub mod active;
pub mod config;
pub mod error;
pub mod index;
pub mod installer;
pub mod item;
pub mod lifecycle;
pub mod manifest;
pub mod prompt;
pub mod registry;
pub mod repository;
pub mod version;

pub use active::{ActiveItemSwitch, ActiveState, FileActiveSwitch};
pub use config::{ContentLayout, RepositoryConfig, TroveConfig};
pub use error::LifecycleError;
pub use index::{IndexEntry, RepositoryIndex};
pub use installer::{ArchiveInstaller, Installer, StagedItem};
pub use item::{InstallRequest, InstallSource, Item, ItemKind, ItemStatus, UpdateCandidate};
pub use lifecycle::{
    DeleteOutcome, InstallOutcome, LifecycleController, Stage, UpdateAllReport, UpdateResult,
};
pub use manifest::{ItemManifest, ManifestMetadata};
pub use prompt::{ConfirmationPrompt, FixedAnswer};
pub use registry::ItemRegistry;
pub use repository::{DownloadLocation, HttpRepository, IndexCache, IndexedRepository, Release, Repository};
pub use version::{needs_action, Action, Version, VersionSpec};
