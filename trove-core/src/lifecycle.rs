//! Item lifecycle orchestration
//!
//! [`LifecycleController`] runs install, update, activate and delete for one
//! item kind as a sequence of guarded stages:
//!
//! ```text
//! Resolving -> Confirming? -> Fetching -> Installing -> Activating? -> Done
//!      \____________\______________\___________\____________\-> Failed
//! ```
//!
//! Stages are per invocation and never persisted. The controller reads
//! state only through [`ItemRegistry`] snapshots and mutates it only
//! through the [`Installer`] and [`ActiveItemSwitch`].
//!
//! The content root is assumed to have a single writer at a time. Two
//! processes installing or deleting the same slug concurrently can race;
//! nothing here locks against that.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::active::ActiveItemSwitch;
use crate::config::ContentLayout;
use crate::error::LifecycleError;
use crate::installer::{Installer, StagedItem};
use crate::item::{InstallRequest, InstallSource, Item, ItemKind, UpdateCandidate};
use crate::prompt::ConfirmationPrompt;
use crate::registry::ItemRegistry;
use crate::repository::{DownloadLocation, Release, Repository};
use crate::version::{needs_action, Action, Version};

/// Stage of a single-item operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Confirming,
    Fetching,
    Installing,
    Activating,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Confirming => "confirming",
            Stage::Fetching => "fetching",
            Stage::Installing => "installing",
            Stage::Activating => "activating",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tracks and logs stage transitions for one operation
struct Progress {
    kind: ItemKind,
    subject: String,
    stage: Stage,
}

impl Progress {
    fn start(kind: ItemKind, subject: impl Into<String>) -> Self {
        let progress = Self {
            kind,
            subject: subject.into(),
            stage: Stage::Resolving,
        };
        tracing::debug!(kind = %kind, subject = %progress.subject, stage = %Stage::Resolving, "stage");
        progress
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        tracing::debug!(kind = %self.kind, subject = %self.subject, stage = %stage, "stage");
    }

    fn fail(&self, error: &LifecycleError) {
        tracing::debug!(
            kind = %self.kind,
            subject = %self.subject,
            stage = %self.stage,
            error = %error,
            "stage failed"
        );
    }
}

/// Result of a completed install request
#[derive(Debug)]
pub enum InstallOutcome {
    /// Installed (and activated, when asked)
    Installed { item: Item, action: Action },
    /// Installed, but the requested activation did not take effect
    InstalledActivationFailed {
        item: Item,
        action: Action,
        error: LifecycleError,
    },
    /// The user declined to overwrite; nothing changed
    Declined { slug: String },
}

impl InstallOutcome {
    pub fn item(&self) -> Option<&Item> {
        match self {
            InstallOutcome::Installed { item, .. }
            | InstallOutcome::InstalledActivationFailed { item, .. } => Some(item),
            InstallOutcome::Declined { .. } => None,
        }
    }

    pub fn action(&self) -> Option<&Action> {
        match self {
            InstallOutcome::Installed { action, .. }
            | InstallOutcome::InstalledActivationFailed { action, .. } => Some(action),
            InstallOutcome::Declined { .. } => None,
        }
    }
}

/// Result of a delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { slug: String },
    Declined { slug: String },
}

/// Outcome of one item in an update-all batch
#[derive(Debug)]
pub struct UpdateResult {
    pub candidate: UpdateCandidate,
    pub outcome: Result<InstallOutcome, LifecycleError>,
}

/// Result of [`LifecycleController::update_all`]
#[derive(Debug, Default)]
pub struct UpdateAllReport {
    /// Items with a newer repository version, ordered by slug
    pub candidates: Vec<UpdateCandidate>,
    /// Per-item outcomes; empty for a dry run
    pub results: Vec<UpdateResult>,
    pub dry_run: bool,
}

impl UpdateAllReport {
    pub fn failures(&self) -> impl Iterator<Item = (&UpdateCandidate, &LifecycleError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (&r.candidate, e)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn updated_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Ok(ref outcome) if outcome.item().is_some()))
            .count()
    }
}

/// Where an install's payload comes from once resolved
enum Payload {
    /// Still in the repository; fetched after confirmation
    Remote(Release),
    /// Already fetched into staging (archive and URL sources)
    Staged(StagedItem),
}

/// A resolved install: what to install and which versions are involved
struct Plan {
    slug: String,
    name: String,
    requested: Option<Version>,
    remote: Version,
    payload: Payload,
}

impl Plan {
    fn target_version(&self) -> &Version {
        self.requested.as_ref().unwrap_or(&self.remote)
    }
}

/// Orchestrates the lifecycle of one item kind
pub struct LifecycleController {
    kind: ItemKind,
    layout: ContentLayout,
    repository: Arc<dyn Repository>,
    installer: Arc<dyn Installer>,
    switch: Arc<dyn ActiveItemSwitch>,
    prompt: Arc<dyn ConfirmationPrompt>,
    check_updates: bool,
}

impl LifecycleController {
    pub fn new(
        kind: ItemKind,
        layout: ContentLayout,
        repository: Arc<dyn Repository>,
        installer: Arc<dyn Installer>,
        switch: Arc<dyn ActiveItemSwitch>,
        prompt: Arc<dyn ConfirmationPrompt>,
    ) -> Self {
        Self {
            kind,
            layout,
            repository,
            installer,
            switch,
            prompt,
            check_updates: true,
        }
    }

    /// Whether status and list views consult the repository
    ///
    /// `update_all` always looks up the latest versions.
    pub fn check_updates(mut self, check_updates: bool) -> Self {
        self.check_updates = check_updates;
        self
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn layout(&self) -> &ContentLayout {
        &self.layout
    }

    /// Fresh snapshot of the installed items
    pub fn registry(&self) -> Result<ItemRegistry, LifecycleError> {
        let active_path = self
            .switch
            .active_path(self.kind)
            .map_err(|e| LifecycleError::state(self.kind, e))?;

        ItemRegistry::scan(self.kind, &self.layout.items_dir(self.kind), active_path)
    }

    /// Snapshot decorated with the repository's latest versions
    ///
    /// Returns the plain snapshot when update checks are off. Lookup
    /// failures are logged and leave the item without update information.
    pub async fn registry_with_updates(&self) -> Result<ItemRegistry, LifecycleError> {
        let registry = self.registry()?;
        if !self.check_updates {
            return Ok(registry);
        }

        Ok(self.lookup_available(registry).await)
    }

    async fn lookup_available(&self, registry: ItemRegistry) -> ItemRegistry {
        let mut available = HashMap::new();
        for item in registry.list_all() {
            match self.repository.lookup(self.kind, &item.slug).await {
                Ok(Some(release)) => {
                    available.insert(item.slug, release.version);
                }
                Ok(None) => {
                    tracing::debug!("{} '{}' is not in the repository", self.kind, item.slug);
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not check {} '{}' for updates: {:#}",
                        self.kind,
                        item.slug,
                        e
                    );
                }
            }
        }

        registry.with_available_versions(available)
    }

    /// One installed item, with update information
    pub async fn status(&self, slug: &str) -> Result<Item, LifecycleError> {
        self.registry_with_updates().await?.find(slug)
    }

    /// Items directory, an item's directory, or its definition file
    pub fn path(&self, slug: Option<&str>, dir: bool) -> Result<std::path::PathBuf, LifecycleError> {
        let Some(slug) = slug else {
            return Ok(self.layout.items_dir(self.kind));
        };

        let item = self.registry()?.find(slug)?;
        if dir {
            Ok(item.source_location)
        } else {
            Ok(item.definition_file())
        }
    }

    /// Install, reinstall or update a single item
    pub async fn install(&self, request: &InstallRequest) -> Result<InstallOutcome, LifecycleError> {
        let mut progress = Progress::start(self.kind, request.source.describe());

        let result = self.run_install(request, &mut progress).await;
        match &result {
            Ok(_) => progress.advance(Stage::Done),
            Err(e) => progress.fail(e),
        }
        result
    }

    async fn run_install(
        &self,
        request: &InstallRequest,
        progress: &mut Progress,
    ) -> Result<InstallOutcome, LifecycleError> {
        let plan = match &request.source {
            InstallSource::Slug(slug) => {
                self.resolve_from_repository(slug, request.requested_version.as_deref())
                    .await?
            }
            InstallSource::ArchivePath(path) => {
                self.resolve_from_archive(&DownloadLocation::Path(path.clone()), &request.source)
                    .await?
            }
            InstallSource::Url(url) => {
                self.resolve_from_archive(&DownloadLocation::Url(url.clone()), &request.source)
                    .await?
            }
        };

        let installed = self.registry()?.find(&plan.slug).ok();
        let installed_version = installed.as_ref().map(|item| &item.installed_version);

        let action = needs_action(installed_version, plan.requested.as_ref(), &plan.remote);
        tracing::debug!("{} '{}': {:?}", self.kind, plan.slug, action);

        match (&action, installed.as_ref()) {
            (Action::NoOp, Some(item)) => {
                return Err(LifecycleError::AlreadyInstalled {
                    kind: self.kind,
                    slug: plan.slug,
                    version: item.installed_version.to_string(),
                });
            }
            (Action::Reinstall, Some(item)) => {
                progress.advance(Stage::Confirming);
                if !request.confirm_overwrite && !self.confirm_overwrite(item, &plan)? {
                    tracing::info!("Keeping {} {}", item.display_name, item.installed_version);
                    return Ok(InstallOutcome::Declined { slug: plan.slug });
                }
            }
            _ => {}
        }

        match (&action, installed.as_ref()) {
            (Action::UpdateTo(version), Some(item)) => tracing::info!(
                "Updating {} ({} -> {})",
                plan.name,
                item.installed_version,
                version
            ),
            _ => tracing::info!("Installing {} ({})", plan.name, plan.target_version()),
        }

        let slug = plan.slug.clone();
        progress.advance(Stage::Fetching);
        let staged = self.fetch(plan).await?;

        progress.advance(Stage::Installing);
        self.installer
            .install(self.kind, staged)
            .map_err(|e| self.install_error(&slug, e))?;

        let item = self
            .registry()?
            .find(&slug)
            .map_err(|e| self.install_error(&slug, anyhow::anyhow!(e)))?;

        if !request.activate_after_install {
            return Ok(InstallOutcome::Installed { item, action });
        }

        progress.advance(Stage::Activating);
        tracing::info!("Activating '{}'...", slug);
        match self.activate(&slug) {
            Ok(item) => Ok(InstallOutcome::Installed { item, action }),
            Err(error) => {
                tracing::warn!("{}", error);
                Ok(InstallOutcome::InstalledActivationFailed {
                    item,
                    action,
                    error,
                })
            }
        }
    }

    async fn resolve_from_repository(
        &self,
        slug: &str,
        requested: Option<&str>,
    ) -> Result<Plan, LifecycleError> {
        let lookup_error = |source: Option<anyhow::Error>| LifecycleError::RepositoryLookup {
            kind: self.kind,
            slug: slug.to_string(),
            source: source.map(Into::into),
        };

        let latest = self
            .repository
            .lookup(self.kind, slug)
            .await
            .map_err(|e| lookup_error(Some(e)))?
            .ok_or_else(|| lookup_error(None))?;

        let release = match requested {
            Some(spec) => {
                let release = self
                    .repository
                    .lookup_version(self.kind, slug, spec)
                    .await
                    .map_err(|e| lookup_error(Some(e)))?
                    .ok_or_else(|| {
                        lookup_error(Some(anyhow::anyhow!("no release matches version '{spec}'")))
                    })?;
                if release.version.as_str() != spec {
                    tracing::info!("Resolved {} -> {}", spec, release.version);
                }
                release
            }
            None => latest.clone(),
        };

        Ok(Plan {
            slug: slug.to_string(),
            name: release.name.clone(),
            requested: requested.map(|_| release.version.clone()),
            remote: latest.version,
            payload: Payload::Remote(release),
        })
    }

    /// Archive and URL sources: the payload itself says what it is
    async fn resolve_from_archive(
        &self,
        location: &DownloadLocation,
        source: &InstallSource,
    ) -> Result<Plan, LifecycleError> {
        let staged = self
            .installer
            .fetch(self.kind, location, None)
            .await
            .map_err(|e| self.install_error(&source.describe(), e))?;

        let version = staged.manifest.metadata.version.clone();
        Ok(Plan {
            slug: staged.slug().to_string(),
            name: staged.manifest.display_name().to_string(),
            requested: Some(version.clone()),
            remote: version,
            payload: Payload::Staged(staged),
        })
    }

    async fn fetch(&self, plan: Plan) -> Result<StagedItem, LifecycleError> {
        let release = match plan.payload {
            Payload::Staged(staged) => return Ok(staged),
            Payload::Remote(release) => release,
        };

        let staged = self
            .installer
            .fetch(self.kind, &release.download, release.digest.as_deref())
            .await
            .map_err(|e| self.install_error(&plan.slug, e))?;

        if staged.slug() != plan.slug {
            return Err(self.install_error(
                &plan.slug,
                anyhow::anyhow!(
                    "archive from {} contains '{}', expected '{}'",
                    release.download,
                    staged.slug(),
                    plan.slug
                ),
            ));
        }

        Ok(staged)
    }

    fn confirm_overwrite(&self, installed: &Item, plan: &Plan) -> Result<bool, LifecycleError> {
        let message = format!(
            "A different version of '{}' is installed ({}). Overwrite it with {}?",
            installed.slug,
            installed.installed_version,
            plan.target_version()
        );

        self.prompt
            .ask(&message)
            .map_err(|e| self.install_error(&installed.slug, e))
    }

    fn install_error(&self, slug: &str, error: anyhow::Error) -> LifecycleError {
        LifecycleError::Install {
            kind: self.kind,
            slug: slug.to_string(),
            source: error.into(),
        }
    }

    /// Make `slug` the active item and verify that it took effect
    pub fn activate(&self, slug: &str) -> Result<Item, LifecycleError> {
        let item = self.registry()?.find(slug)?;
        let activation_error = || LifecycleError::Activation {
            kind: self.kind,
            name: item.display_name.clone(),
        };

        if let Err(e) = self.switch.set_active(self.kind, &item.slug) {
            tracing::warn!("Switching to {} '{}' failed: {:#}", self.kind, item.slug, e);
            return Err(activation_error());
        }

        let switched = self.registry()?.find(slug)?;
        if !switched.is_active {
            return Err(activation_error());
        }

        Ok(switched)
    }

    /// Update an installed item to the latest (or a requested) version
    pub async fn update(
        &self,
        slug: &str,
        requested_version: Option<String>,
        assume_yes: bool,
    ) -> Result<InstallOutcome, LifecycleError> {
        let item = self.registry()?.find(slug)?;

        let request = InstallRequest::new(InstallSource::Slug(item.slug))
            .with_version(requested_version)
            .assume_yes(assume_yes);
        self.install(&request).await
    }

    /// Update every item with a newer repository version, one at a time
    ///
    /// A failure on one item is recorded and the batch continues.
    pub async fn update_all(&self, dry_run: bool) -> Result<UpdateAllReport, LifecycleError> {
        let registry = self.lookup_available(self.registry()?).await;
        let candidates = registry.update_candidates();

        let mut report = UpdateAllReport {
            candidates,
            results: Vec::new(),
            dry_run,
        };

        if dry_run {
            return Ok(report);
        }

        for candidate in report.candidates.clone() {
            let request = InstallRequest::new(InstallSource::Slug(candidate.item.slug.clone()));
            let outcome = self.install(&request).await;

            if let Err(e) = &outcome {
                tracing::warn!("{}", e);
            }

            report.results.push(UpdateResult { candidate, outcome });
        }

        Ok(report)
    }

    /// Remove an installed, inactive item
    pub fn delete(&self, slug: &str, assume_yes: bool) -> Result<DeleteOutcome, LifecycleError> {
        let item = self.registry()?.find(slug)?;

        if item.is_active {
            return Err(LifecycleError::ActiveItemDeletion {
                kind: self.kind,
                slug: item.slug,
            });
        }

        if !assume_yes {
            let message = format!("Are you sure you want to delete the '{}' {}?", item.slug, self.kind);
            let confirmed = self.prompt.ask(&message).map_err(|e| LifecycleError::Deletion {
                kind: self.kind,
                slug: item.slug.clone(),
                source: e.into(),
            })?;

            if !confirmed {
                return Ok(DeleteOutcome::Declined { slug: item.slug });
            }
        }

        self.installer
            .remove(self.kind, &item.slug)
            .map_err(|e| LifecycleError::Deletion {
                kind: self.kind,
                slug: item.slug.clone(),
                source: e.into(),
            })?;

        Ok(DeleteOutcome::Deleted { slug: item.slug })
    }
}
