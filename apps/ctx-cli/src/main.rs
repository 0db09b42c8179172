//! # ctx-cli
//!
//! Command-line interface for the context server.
//!
//! Every command opens the project's server (`.ctx/` by default), activates
//! the modules found under its modules directory, then:
//! - `ctx tags` — print the tag taxonomy
//! - `ctx types <kind>` — list condition/action/value/property types, optionally by tag
//! - `ctx match <file>` — evaluate a condition document for a profile and session
//! - `ctx goal list/show/create/set/remove/report` — manage goals and read funnel reports
//! - `ctx serve` — keep modules loaded and reload them when their directories change

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ctx_server::ServerConfig;
use tracing_subscriber::EnvFilter;

/// Context server CLI — definitions, conditions, goals and funnel reports.
#[derive(Parser)]
#[command(name = "ctx", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Config file (defaults to `<project-root>/.ctx/server.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tag taxonomy as a tree.
    Tags,
    /// List registered types.
    Types {
        /// Kind of type to list.
        #[arg(value_enum)]
        kind: commands::types::TypeKind,
        /// Only types carrying this tag.
        #[arg(long)]
        tag: Option<String>,
        /// With --tag, include types tagged with any descendant tag.
        #[arg(long)]
        recursive: bool,
    },
    /// Evaluate a condition document.
    Match {
        /// Path of the condition JSON document.
        condition: PathBuf,
        /// Id of a stored profile (defaults to an empty profile).
        #[arg(long)]
        profile: Option<String>,
        /// Id of a stored session (defaults to a new empty session).
        #[arg(long)]
        session: Option<String>,
    },
    /// Manage goals.
    Goal {
        #[command(subcommand)]
        command: commands::goal::GoalCommands,
    },
    /// Keep modules loaded and reload them on change.
    Serve,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = match &cli.config {
        Some(path) => ServerConfig::load(path, &project_root),
        None => ServerConfig::load_or_default(&project_root),
    }
    .context("failed to load server config")?;

    init_tracing(&config.log.filter, cli.log_json)?;
    tracing::debug!("project root: {}", project_root.display());

    match &cli.command {
        Commands::Tags => commands::tags::execute(&config),
        Commands::Types { kind, tag, recursive } => {
            commands::types::execute(&config, *kind, tag.as_deref(), *recursive)
        }
        Commands::Match {
            condition,
            profile,
            session,
        } => commands::matching::execute(&config, condition, profile.as_deref(), session.as_deref()),
        Commands::Goal { command } => commands::goal::execute(command, &config),
        Commands::Serve => commands::serve::execute(config),
    }
}

/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` takes precedence over the configured filter.
fn init_tracing(filter: &str, json: bool) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(filter).with_context(|| format!("invalid log filter '{}'", filter))?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
