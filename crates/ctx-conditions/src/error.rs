// error.rs — Error types for the condition evaluation engine.

use ctx_store::StoreError;
use thiserror::Error;

/// Errors surfaced by `ConditionEvaluator`.
///
/// Malformed conditions are not errors: they are logged and evaluate to
/// "no match". Only store failures reach the caller.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The store failed while querying or matching.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a condition could not be interpreted. Logged, then treated as no match.
#[derive(Debug, Error)]
pub(crate) enum ConditionParseError {
    #[error("condition is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Definition(#[from] ctx_definitions::DefinitionError),

    #[error("unknown boolean operator '{0}'")]
    Operator(String),

    #[error("parameter '{parameter}' is not a count: {value}")]
    Count { parameter: String, value: String },
}
