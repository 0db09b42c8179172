//! # ctx-definitions
//!
//! Tag taxonomy and hot-reloadable plugin definitions registry for the
//! context server.
//!
//! Modules contribute a vocabulary of JSON documents: tags, condition types,
//! action types, value types and property types. The registry resolves the
//! cross references between them, classifies condition types for the
//! evaluation engine and answers "which types carry this tag, directly or
//! through sub-tags" from precomputed indexes.
//!
//! ## Key components
//!
//! - [`DefinitionsRegistry`] — serialized writers, lock-free snapshot readers
//! - [`RegistrySnapshot`] — an immutable, fully indexed view of the registry
//! - [`TagTaxonomy`] / [`Tag`] — the tag forest (cycles and orphans repaired)
//! - [`ConditionType`], [`ActionType`], [`ValueType`], [`PropertyType`] — plugin vocabulary
//! - [`Condition`] — a predicate instance, resolved lazily against a snapshot
//! - [`ModuleSource`] — where definition documents come from ([`StaticModule`] in memory)

pub mod condition;
pub mod error;
pub mod module;
pub mod registry;
pub mod tag;
pub mod types;

pub use condition::{Condition, SUB_CONDITIONS};
pub use error::DefinitionError;
pub use module::{DefinitionDocument, MappingSink, ModuleId, ModuleSource, Namespace, StaticModule};
pub use registry::{
    DefinitionKind, DefinitionsRegistry, IndexReport, LoadReport, ModuleContributions, RegistrySnapshot,
    UnresolvedReference,
};
pub use tag::{Tag, TagTaxonomy, TaxonomyReport};
pub use types::{
    ActionType, BooleanOperator, ConditionCategory, ConditionType, Parameter, PluginType, PropertyType,
    PropertyTypeGroup, ValueType, EVENT_CONDITION_TAG, LOGICAL_CONDITION_TAG, PROFILE_CONDITION_TAG,
    SESSION_CONDITION_TAG, USER_CONDITION_TAG,
};
