//! Theme and plugin CLI commands
//!
//! Both kinds share one verb set; `trove theme install foo` and
//! `trove plugin install foo` differ only in the [`ItemKind`] handed to the
//! lifecycle controller.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use std::sync::Arc;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use trove_core::{
    Action, ArchiveInstaller, DeleteOutcome, FileActiveSwitch, HttpRepository, InstallOutcome,
    InstallRequest, InstallSource, Item, ItemKind, ItemStatus, LifecycleController, TroveConfig,
    UpdateAllReport,
};

use crate::prompt::StdinPrompt;

#[derive(Subcommand, Debug)]
pub enum ItemSubcommand {
    /// Show installed items, or details of one
    Status {
        /// Item slug
        slug: Option<String>,
    },

    /// Make an installed item the active one
    Activate {
        /// Item slug
        slug: String,
    },

    /// Print the items directory, or an item's definition file
    Path {
        /// Item slug
        slug: Option<String>,

        /// Print the item's directory instead of its definition file
        #[clap(long)]
        dir: bool,
    },

    /// Install from the repository, a local archive or a URL
    Install {
        /// Repository slug, path to a .tar.gz, or download URL
        source: String,

        /// Version to install (exact, ^x.y or ~x.y)
        #[clap(long)]
        version: Option<String>,

        /// Activate after installing
        #[clap(long)]
        activate: bool,

        /// Overwrite a different installed version without asking
        #[clap(long, short)]
        yes: bool,
    },

    /// Update an installed item
    Update {
        /// Item slug
        slug: String,

        /// Version to update (or downgrade) to
        #[clap(long)]
        version: Option<String>,

        /// Overwrite without asking when a specific version is requested
        #[clap(long, short)]
        yes: bool,
    },

    /// Update every item with a newer version in the repository
    UpdateAll {
        /// Show what would be updated without making changes
        #[clap(long)]
        dry_run: bool,
    },

    /// Delete an inactive item
    Delete {
        /// Item slug
        slug: String,

        /// Delete without asking
        #[clap(long, short)]
        yes: bool,
    },

    /// List installed items
    List {
        /// Output format
        #[clap(long, value_enum, default_value = "table")]
        format: ListFormat,

        /// Only show items with this status
        #[clap(long, value_enum)]
        status: Option<StatusFilter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    Table,
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFilter {
    Active,
    Inactive,
}

impl StatusFilter {
    fn matches(self, status: ItemStatus) -> bool {
        matches!(
            (self, status),
            (StatusFilter::Active, ItemStatus::Active) | (StatusFilter::Inactive, ItemStatus::Inactive)
        )
    }
}

/// Settings shared by every item command in one invocation
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: TroveConfig,
    /// Bypass the index cache
    pub refresh: bool,
    /// Skip repository lookups for status and list
    pub offline: bool,
}

impl CommandContext {
    /// Wire a controller for `kind` to the HTTP repository and the content root
    pub fn controller(&self, kind: ItemKind) -> Result<LifecycleController> {
        let layout = self.config.layout();
        let repository =
            HttpRepository::new(self.config.repository.clone()).force_refresh(self.refresh);
        let installer = ArchiveInstaller::new(layout.clone())?;

        Ok(LifecycleController::new(
            kind,
            layout.clone(),
            Arc::new(repository),
            Arc::new(installer),
            Arc::new(FileActiveSwitch::new(layout)),
            Arc::new(StdinPrompt),
        )
        .check_updates(!self.offline))
    }
}

impl ItemSubcommand {
    pub async fn execute(self, kind: ItemKind, context: &CommandContext) -> Result<()> {
        let controller = context.controller(kind)?;

        match self {
            ItemSubcommand::Status { slug } => execute_status(&controller, slug.as_deref()).await,
            ItemSubcommand::Activate { slug } => execute_activate(&controller, &slug),
            ItemSubcommand::Path { slug, dir } => {
                let path = controller.path(slug.as_deref(), dir)?;
                println!("{}", path.display());
                Ok(())
            }
            ItemSubcommand::Install {
                source,
                version,
                activate,
                yes,
            } => {
                let request = InstallRequest::new(InstallSource::parse(&source))
                    .with_version(version)
                    .activate(activate)
                    .assume_yes(yes);
                let outcome = controller.install(&request).await?;
                report_install(kind, outcome, activate)
            }
            ItemSubcommand::Update { slug, version, yes } => {
                let outcome = controller.update(&slug, version, yes).await?;
                report_install(kind, outcome, false)
            }
            ItemSubcommand::UpdateAll { dry_run } => execute_update_all(&controller, dry_run).await,
            ItemSubcommand::Delete { slug, yes } => {
                match controller.delete(&slug, yes)? {
                    DeleteOutcome::Deleted { slug } => println!("Deleted '{slug}' {kind}."),
                    DeleteOutcome::Declined { slug } => println!("Kept '{slug}' {kind}."),
                }
                Ok(())
            }
            ItemSubcommand::List { format, status } => {
                execute_list(&controller, format, status).await
            }
        }
    }
}

/// One row of the status table and of JSON/YAML list output
#[derive(Debug, Tabled, Serialize, PartialEq)]
struct ItemRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "update")]
    update: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    update_version: Option<String>,
}

impl ItemRow {
    fn from_item(item: &Item) -> Self {
        let update_version = item
            .available_version
            .as_ref()
            .filter(|available| **available > item.installed_version)
            .map(|v| v.to_string());

        Self {
            name: item.slug.clone(),
            status: item.status().to_string(),
            update: if update_version.is_some() {
                "available".to_string()
            } else {
                "none".to_string()
            },
            version: item.installed_version.to_string(),
            update_version,
        }
    }
}

fn render_table(items: &[Item]) -> String {
    let rows: Vec<ItemRow> = items.iter().map(ItemRow::from_item).collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

fn render_list(items: &[Item], format: ListFormat) -> Result<String> {
    match format {
        ListFormat::Table => Ok(render_table(items)),
        ListFormat::Json => {
            let rows: Vec<ItemRow> = items.iter().map(ItemRow::from_item).collect();
            serde_json::to_string_pretty(&rows).context("Failed to serialize list as JSON")
        }
        ListFormat::Yaml => {
            let rows: Vec<ItemRow> = items.iter().map(ItemRow::from_item).collect();
            serde_yaml_ng::to_string(&rows).context("Failed to serialize list as YAML")
        }
    }
}

/// Details block for a single item
fn render_item_status(item: &Item) -> String {
    let mut version = item.installed_version.to_string();
    if item
        .available_version
        .as_ref()
        .is_some_and(|available| *available > item.installed_version)
    {
        version.push_str(" (Update available)");
    }

    let mut lines = vec![
        format!("{} {} details:", item.kind.title(), item.slug),
        format!("    Name: {}", item.display_name),
        format!("    Status: {}", item.status().long()),
        format!("    Version: {version}"),
    ];
    if let Some(author) = &item.author {
        lines.push(format!("    Author: {author}"));
    }

    lines.join("\n")
}

async fn execute_status(controller: &LifecycleController, slug: Option<&str>) -> Result<()> {
    let kind = controller.kind();

    if let Some(slug) = slug {
        let item = controller.status(slug).await?;
        println!("{}", render_item_status(&item));
        return Ok(());
    }

    let items = controller.registry_with_updates().await?.list_all();
    if items.is_empty() {
        println!("No {} installed.", kind.dir_name());
        return Ok(());
    }

    println!("{} installed {}:\n", items.len(), kind.dir_name());
    println!("{}", render_table(&items));
    Ok(())
}

async fn execute_list(
    controller: &LifecycleController,
    format: ListFormat,
    status: Option<StatusFilter>,
) -> Result<()> {
    let items: Vec<Item> = controller
        .registry_with_updates()
        .await?
        .list_all()
        .into_iter()
        .filter(|item| status.map_or(true, |filter| filter.matches(item.status())))
        .collect();

    println!("{}", render_list(&items, format)?);
    Ok(())
}

fn execute_activate(controller: &LifecycleController, slug: &str) -> Result<()> {
    let kind = controller.kind();

    let current = controller.registry()?.find(slug)?;
    if current.is_active {
        println!("The '{}' {} is already active.", current.display_name, kind);
        return Ok(());
    }

    let item = controller.activate(slug)?;
    println!("Switched to '{}' {}.", item.display_name, kind);
    Ok(())
}

fn install_message(item: &Item, action: &Action) -> String {
    match action {
        Action::UpdateTo(version) => format!("Updated {} to {}.", item.display_name, version),
        Action::Reinstall => format!(
            "Replaced {} with version {}.",
            item.display_name, item.installed_version
        ),
        Action::Install | Action::NoOp => format!(
            "Installed {} ({}).",
            item.display_name, item.installed_version
        ),
    }
}

fn report_install(kind: ItemKind, outcome: InstallOutcome, activated: bool) -> Result<()> {
    match outcome {
        InstallOutcome::Installed { item, action } => {
            println!("{}", install_message(&item, &action));
            if activated {
                println!("Switched to '{}' {}.", item.display_name, kind);
            }
            Ok(())
        }
        InstallOutcome::InstalledActivationFailed {
            item,
            action,
            error,
        } => {
            println!("{}", install_message(&item, &action));
            Err(error.into())
        }
        InstallOutcome::Declined { slug } => {
            println!("Kept the installed version of '{slug}'.");
            Ok(())
        }
    }
}

/// Table row for the update preview
#[derive(Tabled)]
struct UpdateRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "current")]
    current: String,
    #[tabled(rename = "latest")]
    latest: String,
}

fn render_update_preview(report: &UpdateAllReport) -> String {
    let rows: Vec<UpdateRow> = report
        .candidates
        .iter()
        .map(|candidate| UpdateRow {
            name: candidate.item.slug.clone(),
            current: candidate.item.installed_version.to_string(),
            latest: candidate.version.to_string(),
        })
        .collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

/// Per-item lines followed by the totals
fn render_update_summary(kind: ItemKind, report: &UpdateAllReport) -> String {
    let mut lines = Vec::new();

    for result in &report.results {
        let candidate = &result.candidate;
        let line = match &result.outcome {
            Ok(outcome) if outcome.item().is_some() => format!(
                "  updated  {} {} -> {}",
                candidate.item.slug, candidate.item.installed_version, candidate.version
            ),
            Ok(_) => format!("  skipped  {}", candidate.item.slug),
            Err(e) => format!("  failed   {}: {}", candidate.item.slug, e),
        };
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(format!(
        "Updated {} of {} {}.",
        report.updated_count(),
        report.candidates.len(),
        kind.dir_name()
    ));

    lines.join("\n")
}

async fn execute_update_all(controller: &LifecycleController, dry_run: bool) -> Result<()> {
    let kind = controller.kind();
    let report = controller.update_all(dry_run).await?;

    if report.candidates.is_empty() {
        println!("All installed {} are up to date.", kind.dir_name());
        return Ok(());
    }

    if report.dry_run {
        println!("Updates available:\n");
        println!("{}", render_update_preview(&report));
        println!("\n--dry-run: No changes made.");
        return Ok(());
    }

    println!("{}", render_update_summary(kind, &report));

    let failures = report.failure_count();
    if failures > 0 {
        anyhow::bail!("{} of {} {} failed to update", failures, report.candidates.len(), kind.dir_name());
    }

    Ok(())
}
