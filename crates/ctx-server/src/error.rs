// error.rs — Error types for the context server.

use std::path::PathBuf;

use ctx_conditions::EvaluationError;
use ctx_definitions::DefinitionError;
use ctx_goals::GoalError;
use ctx_store::StoreError;
use thiserror::Error;

/// Errors that can occur while configuring or running the context server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The config file exists but is not valid TOML for `ServerConfig`.
    #[error("invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// An I/O operation on the given path failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A module directory is not usable.
    #[error("invalid module at {path}: {reason}")]
    Module { path: PathBuf, reason: String },

    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("goal error: {0}")]
    Goal(#[from] GoalError),

    /// The lifecycle actor is gone; no further commands can be delivered.
    #[error("lifecycle actor has stopped")]
    LifecycleStopped,
}
