// error.rs — Error types for the definitions subsystem.
//
// Parse failures and unresolved references are recovered inside the
// registry (logged, document skipped). They still get proper variants so the
// load report can carry them back to callers that want to display them.

use thiserror::Error;

use crate::module::{ModuleId, Namespace};

/// Errors that can occur while loading or resolving definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// A definition document is not valid JSON for its namespace.
    #[error("failed to parse {namespace} document '{origin}': {source}")]
    Parse {
        namespace: Namespace,
        origin: String,
        source: serde_json::Error,
    },

    /// The module source could not enumerate or read its documents.
    #[error("module '{module_id}' could not provide {namespace} documents: {reason}")]
    Source {
        module_id: ModuleId,
        namespace: Namespace,
        reason: String,
    },

    /// A store mapping could not be created.
    #[error("failed to create mapping '{name}': {reason}")]
    Mapping { name: String, reason: String },

    /// A condition references a condition type that is not registered.
    #[error("unknown condition type '{0}'")]
    UnknownConditionType(String),

    /// A condition document is malformed (e.g. a nested condition is not an object).
    #[error("malformed condition: {0}")]
    MalformedCondition(String),

    /// Tag parent links form a cycle. The listed tags were detached to keep
    /// the taxonomy a forest.
    #[error("tag hierarchy contains a cycle through {0:?}")]
    TagCycle(Vec<String>),
}
