//! Trove - manage themes and plugins from the command line

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trove_core::{ItemKind, TroveConfig};

mod item_cli;
mod prompt;

use item_cli::{CommandContext, ItemSubcommand};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Log output formats
#[derive(Debug, Clone, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(name = "trove", about = "Install, update and activate themes and plugins", version)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Log output format
    #[clap(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Configuration file (defaults to the platform config directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Content root holding themes/ and plugins/
    #[clap(long, env = "TROVE_ROOT", global = true)]
    root: Option<PathBuf>,

    /// Repository base URL
    #[clap(long, env = "TROVE_REPOSITORY", global = true)]
    repository: Option<String>,

    /// Force refresh of repository indexes (bypass cache)
    #[clap(long, global = true)]
    refresh: bool,

    /// Do not contact the repository when reporting status
    #[clap(long, global = true)]
    offline: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Manage themes
    Theme {
        #[clap(subcommand)]
        command: ItemSubcommand,
    },

    /// Manage plugins
    Plugin {
        #[clap(subcommand)]
        command: ItemSubcommand,
    },
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr; stdout carries command output only.
fn initialize_tracing(log_level: &LogLevel, log_format: &LogFormat) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    match log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init(),
    }
}

/// Config file values, overridden by flags and environment
fn load_config(cli: &Cli) -> Result<TroveConfig> {
    let mut config = TroveConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(url) = &cli.repository {
        config.repository.url = url.trim_end_matches('/').to_string();
    }

    tracing::debug!(
        root = %config.root.display(),
        repository = %config.repository.url,
        "configuration loaded"
    );
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let context = CommandContext {
        config: load_config(&cli)?,
        refresh: cli.refresh,
        offline: cli.offline,
    };

    match cli.command {
        Command::Theme { command } => command.execute(ItemKind::Theme, &context).await,
        Command::Plugin { command } => command.execute(ItemKind::Plugin, &context).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, &cli.log_format);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
