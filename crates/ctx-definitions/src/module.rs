// module.rs — Module sources: where definition documents come from.
//
// A module is an independently deployable unit that contributes definition
// documents under logical namespaces (tags, conditions, actions, ...). The
// registry never cares how a module is packaged; it only asks a
// `ModuleSource` for the documents of one namespace at a time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;

/// Identifier of the module that contributed a definition.
///
/// Every registered definition remembers its module so that all of a
/// module's vocabulary can be retracted when the module deactivates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Logical namespaces a module can contribute documents to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    Mappings,
    Tags,
    Conditions,
    Actions,
    Values,
    Properties,
    Goals,
}

impl Namespace {
    /// Namespaces the registry loads, in dependency order: later stages
    /// resolve references created by earlier ones. Goals are loaded by the
    /// goal engine after the registry finishes.
    pub const REGISTRY_LOAD_ORDER: [Namespace; 6] = [
        Namespace::Mappings,
        Namespace::Tags,
        Namespace::Conditions,
        Namespace::Actions,
        Namespace::Values,
        Namespace::Properties,
    ];

    /// Directory name used by on-disk module layouts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Mappings => "mappings",
            Namespace::Tags => "tags",
            Namespace::Conditions => "conditions",
            Namespace::Actions => "actions",
            Namespace::Values => "values",
            Namespace::Properties => "properties",
            Namespace::Goals => "goals",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw definition document as provided by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionDocument {
    /// Logical document name (file stem for on-disk modules). Mappings use
    /// it as the mapping name; property groups are recognized by it.
    pub name: String,
    /// Human-readable location, used only in log messages.
    pub origin: String,
    /// Raw JSON content.
    pub content: String,
}

impl DefinitionDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            origin: name.clone(),
            name,
            content: content.into(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// A loaded module that can enumerate its definition documents.
///
/// Implementations: [`StaticModule`] (in-memory, used by tests and
/// embedders) and the directory-backed module in `ctx-server`.
pub trait ModuleSource: Send + Sync {
    /// The module's identifier.
    fn module_id(&self) -> ModuleId;

    /// All documents the module provides under `namespace`. A module with no
    /// documents in a namespace returns an empty list, not an error.
    fn documents(&self, namespace: Namespace) -> Result<Vec<DefinitionDocument>, DefinitionError>;
}

/// Receives store mappings declared by modules (`mappings` namespace).
pub trait MappingSink {
    fn create_mapping(&self, name: &str, mapping: &str) -> Result<(), DefinitionError>;
}

/// An in-memory module.
#[derive(Debug, Clone)]
pub struct StaticModule {
    module_id: ModuleId,
    documents: BTreeMap<Namespace, Vec<DefinitionDocument>>,
}

impl StaticModule {
    pub fn new(module_id: impl Into<ModuleId>) -> Self {
        Self {
            module_id: module_id.into(),
            documents: BTreeMap::new(),
        }
    }

    /// Add a document under `namespace`.
    pub fn with_document(
        mut self,
        namespace: Namespace,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.add_document(namespace, DefinitionDocument::new(name, content));
        self
    }

    pub fn add_document(&mut self, namespace: Namespace, document: DefinitionDocument) {
        self.documents.entry(namespace).or_default().push(document);
    }
}

impl ModuleSource for StaticModule {
    fn module_id(&self) -> ModuleId {
        self.module_id.clone()
    }

    fn documents(&self, namespace: Namespace) -> Result<Vec<DefinitionDocument>, DefinitionError> {
        Ok(self.documents.get(&namespace).cloned().unwrap_or_default())
    }
}
