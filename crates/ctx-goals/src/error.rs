// error.rs — Error types for the goal subsystem.

use ctx_definitions::DefinitionError;
use ctx_store::StoreError;
use thiserror::Error;

/// Errors that can occur during goal and report operations.
#[derive(Debug, Error)]
pub enum GoalError {
    /// A goal condition references a condition type that is not registered.
    /// Saving such a goal is rejected.
    #[error("goal '{goal_id}' has an unresolvable condition: {source}")]
    UnresolvedCondition {
        goal_id: String,
        source: DefinitionError,
    },

    /// The action type used by compiled goal rules is not registered.
    #[error("action type '{0}' is not registered, cannot compile goal rules")]
    MissingActionType(String),

    /// The store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Failed to serialize/deserialize goal data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested goal was not found.
    #[error("goal not found: {0}")]
    NotFound(String),
}
