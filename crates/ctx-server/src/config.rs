// config.rs — Server configuration.
//
// ServerConfig determines where the server finds modules and keeps its data,
// plus the definition names the goal engine relies on. `for_project()`
// produces the standard `.ctx/` layout; `load_or_default()` overlays
// `.ctx/server.toml` on top of it when the file exists.

use std::path::{Path, PathBuf};

use ctx_goals::GoalsSettings;
use ctx_store::DateInterval;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Directory holding the server's files inside a project.
pub const CTX_DIR: &str = ".ctx";

/// Config file name inside [`CTX_DIR`].
pub const CONFIG_FILE: &str = "server.toml";

/// Configuration for the context server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Directory scanned for modules (one subdirectory per module).
    pub modules_dir: PathBuf,

    /// Directory for persisted items (goals, rules, sessions, mappings).
    pub data_dir: PathBuf,

    #[serde(default)]
    pub goals: GoalsConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Definition names used when compiling goals and building reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalsConfig {
    pub set_property_action: String,
    pub goal_match_condition: String,
    pub and_condition: String,
}

impl Default for GoalsConfig {
    fn default() -> Self {
        let settings = GoalsSettings::default();
        Self {
            set_property_action: settings.set_property_action,
            goal_match_condition: settings.goal_match_condition,
            and_condition: settings.and_condition,
        }
    }
}

/// Funnel report options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Bucket width of the `sessionCreationDate` split.
    pub date_interval: DateInterval,
    /// Session field holding the creation time.
    pub session_date_field: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let settings = GoalsSettings::default();
        Self {
            date_interval: settings.date_interval,
            session_date_field: settings.session_date_field,
        }
    }
}

/// Logging options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` filter directives, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// On-disk shape: every field optional, paths relative to the project root.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    modules_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    goals: GoalsConfig,
    report: ReportConfig,
    log: LogConfig,
}

impl ServerConfig {
    /// Create a config with the standard `.ctx/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let ctx_dir = project_root.as_ref().join(CTX_DIR);
        Self {
            modules_dir: ctx_dir.join("modules"),
            data_dir: ctx_dir.join("data"),
            goals: GoalsConfig::default(),
            report: ReportConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Default location of the config file for a project.
    pub fn default_path(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(CTX_DIR).join(CONFIG_FILE)
    }

    /// Load a config file. Missing entries take their `for_project`
    /// defaults; relative paths are resolved against `project_root`.
    pub fn load(path: &Path, project_root: &Path) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|source| ServerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|source| ServerError::Config {
            path: path.to_path_buf(),
            source,
        })?;

        let defaults = Self::for_project(project_root);
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { project_root.join(p) };
        Ok(Self {
            modules_dir: file.modules_dir.map(resolve).unwrap_or(defaults.modules_dir),
            data_dir: file.data_dir.map(resolve).unwrap_or(defaults.data_dir),
            goals: file.goals,
            report: file.report,
            log: file.log,
        })
    }

    /// Load `.ctx/server.toml` if it exists, otherwise use the defaults.
    /// A file that exists but does not parse is an error.
    pub fn load_or_default(project_root: impl AsRef<Path>) -> Result<Self, ServerError> {
        let root = project_root.as_ref();
        let path = Self::default_path(root);
        if path.exists() {
            tracing::debug!("loading config from {}", path.display());
            Self::load(&path, root)
        } else {
            Ok(Self::for_project(root))
        }
    }

    /// Settings handed to the goal engine.
    pub fn goals_settings(&self) -> GoalsSettings {
        GoalsSettings {
            set_property_action: self.goals.set_property_action.clone(),
            goal_match_condition: self.goals.goal_match_condition.clone(),
            and_condition: self.goals.and_condition.clone(),
            session_date_field: self.report.session_date_field.clone(),
            date_interval: self.report.date_interval,
        }
    }
}
