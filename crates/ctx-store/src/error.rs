// error.rs — Error types for the store subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize item data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store has no predicate for this condition type.
    #[error("unsupported condition type '{0}'")]
    UnsupportedCondition(String),

    /// A condition's parameters cannot be interpreted.
    #[error("invalid condition '{condition_type}': {reason}")]
    InvalidCondition {
        condition_type: String,
        reason: String,
    },

    /// The requested item does not exist.
    #[error("{item_type} '{item_id}' not found")]
    NotFound { item_type: String, item_id: String },

    /// An item was converted to an entity of another type.
    #[error("expected a {expected} item, found {found}")]
    WrongItemType { expected: String, found: String },
}
