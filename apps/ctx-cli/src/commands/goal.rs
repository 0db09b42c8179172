// goal.rs — Goal subcommands: list, show, create, set, remove, report.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use ctx_definitions::Condition;
use ctx_goals::{Goal, GoalReport, Metadata};
use ctx_server::{ContextServer, ServerConfig};

#[derive(Subcommand)]
pub enum GoalCommands {
    /// List all goals.
    List {
        /// Include hidden goals.
        #[arg(long)]
        all: bool,
    },
    /// Show a goal as JSON.
    Show {
        /// Goal ID.
        id: String,
    },
    /// Create an empty goal (no start or target event yet).
    Create {
        /// Goal ID.
        id: String,
        /// Display name.
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Create or replace a goal from a JSON document.
    Set {
        /// Path of the goal JSON document.
        file: PathBuf,
        /// Goal ID (defaults to `metadata.id` of the document).
        #[arg(long)]
        id: Option<String>,
    },
    /// Delete a goal and retract its rules.
    Remove {
        /// Goal ID.
        id: String,
    },
    /// Print the funnel report of a goal.
    Report {
        /// Goal ID.
        id: String,
        /// `sessionCreationDate` or a session field to split by.
        #[arg(long)]
        split: Option<String>,
        /// Path of a condition JSON document narrowing the sessions.
        #[arg(long)]
        filter: Option<PathBuf>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: &GoalCommands, config: &ServerConfig) -> anyhow::Result<()> {
    let server = super::open_server(config)?;

    match cmd {
        GoalCommands::List { all } => list_goals(&server, *all),
        GoalCommands::Show { id } => show_goal(&server, id),
        GoalCommands::Create { id, name, description } => {
            server.goals().create_goal(id, name, description)?;
            println!("Created goal: {}", id);
            Ok(())
        }
        GoalCommands::Set { file, id } => set_goal(&server, file, id.as_deref()),
        GoalCommands::Remove { id } => {
            if server.goals().remove_goal(id)? {
                println!("Removed goal: {}", id);
            } else {
                eprintln!("Goal not found: {}", id);
                std::process::exit(1);
            }
            Ok(())
        }
        GoalCommands::Report {
            id,
            split,
            filter,
            json,
        } => report(&server, id, split.as_deref(), filter.as_deref(), *json),
    }
}

fn list_goals(server: &ContextServer, all: bool) -> anyhow::Result<()> {
    let goals: Vec<Metadata> = server
        .goals()
        .get_goal_metadatas()?
        .into_iter()
        .filter(|m| all || !m.hidden)
        .collect();

    if goals.is_empty() {
        println!("No goals found.");
        return Ok(());
    }

    println!("{:<24} {:<30} {:<9} {:<16}", "ID", "NAME", "ENABLED", "MODULE");
    println!("{}", "-".repeat(82));
    for m in &goals {
        println!(
            "{:<24} {:<30} {:<9} {:<16}",
            super::truncate(&m.id, 22),
            super::truncate(&m.name, 28),
            if m.enabled { "yes" } else { "no" },
            m.module_id.as_deref().unwrap_or("-"),
        );
    }
    println!("\n{} goal(s) total.", goals.len());
    Ok(())
}

fn show_goal(server: &ContextServer, id: &str) -> anyhow::Result<()> {
    let goal = server.goal(id)?;
    println!("{}", serde_json::to_string_pretty(&goal)?);
    Ok(())
}

fn set_goal(server: &ContextServer, file: &Path, id: Option<&str>) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let goal: Goal = serde_json::from_str(&json).with_context(|| format!("invalid goal document {}", file.display()))?;
    let goal_id = id.unwrap_or(&goal.metadata.id).to_string();
    if goal_id.is_empty() {
        anyhow::bail!("goal document has no metadata.id, pass --id");
    }
    server.goals().set_goal(&goal_id, goal)?;
    println!("Saved goal: {}", goal_id);
    Ok(())
}

fn report(
    server: &ContextServer,
    id: &str,
    split: Option<&str>,
    filter: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let filter = match filter {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            Some(Condition::from_json(&json).with_context(|| format!("invalid condition document {}", path.display()))?)
        }
        None => None,
    };
    let report = server.goal_report(id, split, filter.as_ref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report(&report));
    }
    Ok(())
}

fn format_report(report: &GoalReport) -> String {
    let global = &report.global_stats;
    let mut out = format!(
        "Started:    {}\nReached:    {}\nConversion: {}\n",
        global.start_count,
        global.target_count,
        percent(global.conversion_rate)
    );
    if !report.split.is_empty() {
        out.push_str(&format!(
            "\n{:<24} {:>10} {:>10} {:>12} {:>12}\n",
            "SPLIT", "STARTED", "REACHED", "CONVERSION", "SHARE"
        ));
        out.push_str(&"-".repeat(72));
        out.push('\n');
        for (key, stat) in &report.split {
            out.push_str(&format!(
                "{:<24} {:>10} {:>10} {:>12} {:>12}\n",
                super::truncate(key, 22),
                stat.start_count,
                stat.target_count,
                percent(stat.conversion_rate),
                percent(stat.percentage)
            ));
        }
    }
    out
}

/// Non-finite ratios (no starts) print as `n/a`.
fn percent(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.1}%", ratio * 100.0)
    } else {
        "n/a".to_string()
    }
}
