// types.rs — Plugin-contributed vocabulary: condition, action, value and
// property types.
//
// All plugin types share the same registration shape (id, owning module,
// declared tag ids, resolved tags). The shared behavior lives in the
// `PluginType` trait so the registry can index every table with one
// generic routine.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::module::ModuleId;

/// Tag ids that classify condition types for evaluation.
pub const EVENT_CONDITION_TAG: &str = "eventCondition";
pub const PROFILE_CONDITION_TAG: &str = "profileCondition";
pub const USER_CONDITION_TAG: &str = "userCondition";
pub const SESSION_CONDITION_TAG: &str = "sessionCondition";
pub const LOGICAL_CONDITION_TAG: &str = "logicalCondition";

/// Common surface of every registered plugin definition.
pub trait PluginType {
    fn id(&self) -> &str;
    fn module_id(&self) -> Option<&ModuleId>;
    /// Tag ids declared by the document.
    fn tag_ids(&self) -> &BTreeSet<String>;
    /// Declared tag ids that resolved to registered tags.
    fn resolved_tags(&self) -> &BTreeSet<String>;
    fn set_resolved_tags(&mut self, tags: BTreeSet<String>);
}

/// A declared parameter of a condition or action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub id: String,
    /// Value type id of the parameter.
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub multivalued: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

/// How the evaluation engine treats a condition type. Computed once at
/// registration time, never re-derived during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionCategory {
    /// Matches against the event stream of a session.
    Event,
    /// Matches the profile entity.
    Profile,
    /// Matches the session entity.
    Session,
    /// Combines sub-conditions.
    Logical,
    #[default]
    Unclassified,
}

impl ConditionCategory {
    /// Derive the category from a set of tag ids. Event wins over profile,
    /// profile over session, session over logical.
    pub fn from_tags(tags: &BTreeSet<String>) -> Self {
        if tags.contains(EVENT_CONDITION_TAG) {
            ConditionCategory::Event
        } else if tags.contains(PROFILE_CONDITION_TAG) || tags.contains(USER_CONDITION_TAG) {
            ConditionCategory::Profile
        } else if tags.contains(SESSION_CONDITION_TAG) {
            ConditionCategory::Session
        } else if tags.contains(LOGICAL_CONDITION_TAG) {
            ConditionCategory::Logical
        } else {
            ConditionCategory::Unclassified
        }
    }
}

impl fmt::Display for ConditionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionCategory::Event => write!(f, "event"),
            ConditionCategory::Profile => write!(f, "profile"),
            ConditionCategory::Session => write!(f, "session"),
            ConditionCategory::Logical => write!(f, "logical"),
            ConditionCategory::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Boolean operator of a logical condition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOperator {
    #[default]
    And,
    Or,
}

impl BooleanOperator {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "and" => Some(BooleanOperator::And),
            "or" => Some(BooleanOperator::Or),
            _ => None,
        }
    }
}

/// A predicate type contributed by a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionType {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_key: Option<String>,

    #[serde(default, rename = "tags")]
    pub tag_ids: BTreeSet<String>,

    /// Explicit category; when absent it is derived from the resolved tags.
    #[serde(default, rename = "category", skip_serializing_if = "Option::is_none")]
    pub declared_category: Option<ConditionCategory>,

    /// Name of the store predicate implementing this type. Defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_evaluator: Option<String>,

    /// Default operator for logical types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<BooleanOperator>,

    #[serde(default)]
    pub parameters: Vec<Parameter>,

    #[serde(skip)]
    pub category: ConditionCategory,

    #[serde(skip)]
    pub resolved_tags: BTreeSet<String>,

    #[serde(skip)]
    pub module_id: Option<ModuleId>,
}

impl ConditionType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name_key: None,
            description_key: None,
            tag_ids: BTreeSet::new(),
            declared_category: None,
            condition_evaluator: None,
            operator: None,
            parameters: Vec::new(),
            category: ConditionCategory::Unclassified,
            resolved_tags: BTreeSet::new(),
            module_id: None,
        }
    }

    pub fn with_tag(mut self, tag_id: impl Into<String>) -> Self {
        self.tag_ids.insert(tag_id.into());
        self
    }

    pub fn with_evaluator(mut self, evaluator: impl Into<String>) -> Self {
        self.condition_evaluator = Some(evaluator.into());
        self
    }

    /// Store predicate name for this type.
    pub fn evaluator(&self) -> &str {
        self.condition_evaluator.as_deref().unwrap_or(&self.id)
    }

    /// Recompute `category` from the declared category or resolved tags.
    /// Declared tag ids are consulted too, so a type tagged `eventCondition`
    /// stays an event condition even if that tag is not registered.
    pub fn classify(&mut self) {
        self.category = self.declared_category.unwrap_or_else(|| {
            match ConditionCategory::from_tags(&self.resolved_tags) {
                ConditionCategory::Unclassified => ConditionCategory::from_tags(&self.tag_ids),
                category => category,
            }
        });
    }
}

/// An effect type contributed by a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionType {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_key: Option<String>,

    #[serde(default, rename = "tags")]
    pub tag_ids: BTreeSet<String>,

    /// Name of the executor the external rule engine should run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_executor: Option<String>,

    #[serde(default)]
    pub parameters: Vec<Parameter>,

    #[serde(skip)]
    pub resolved_tags: BTreeSet<String>,

    #[serde(skip)]
    pub module_id: Option<ModuleId>,
}

impl ActionType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name_key: None,
            tag_ids: BTreeSet::new(),
            action_executor: None,
            parameters: Vec::new(),
            resolved_tags: BTreeSet::new(),
            module_id: None,
        }
    }

    pub fn with_tag(mut self, tag_id: impl Into<String>) -> Self {
        self.tag_ids.insert(tag_id.into());
        self
    }
}

/// A data kind contributed by a module (e.g. `string`, `date`, `integer`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueType {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_key: Option<String>,

    #[serde(default, rename = "tags")]
    pub tag_ids: BTreeSet<String>,

    #[serde(skip)]
    pub resolved_tags: BTreeSet<String>,

    #[serde(skip)]
    pub module_id: Option<ModuleId>,
}

impl ValueType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name_key: None,
            tag_ids: BTreeSet::new(),
            resolved_tags: BTreeSet::new(),
            module_id: None,
        }
    }

    pub fn with_tag(mut self, tag_id: impl Into<String>) -> Self {
        self.tag_ids.insert(tag_id.into());
        self
    }
}

/// A profile/session property declared by a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyType {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_key: Option<String>,

    #[serde(rename = "type")]
    pub value_type_id: String,

    #[serde(default = "default_group")]
    pub group_id: String,

    #[serde(default)]
    pub rank: f64,

    #[serde(default, rename = "tags")]
    pub tag_ids: BTreeSet<String>,

    /// Incoming property names automatically mapped onto this property.
    #[serde(default)]
    pub automatic_mappings_from: Vec<String>,

    #[serde(skip)]
    pub value_type: Option<Arc<ValueType>>,

    #[serde(skip)]
    pub resolved_tags: BTreeSet<String>,

    #[serde(skip)]
    pub module_id: Option<ModuleId>,
}

fn default_group() -> String {
    "default".to_string()
}

/// A named group of property types, ordered by `(rank, id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyTypeGroup {
    pub id: String,

    #[serde(default)]
    pub rank: f64,

    /// Member property type ids. Filled by the registry index pass.
    #[serde(skip)]
    pub property_type_ids: BTreeSet<String>,

    /// True when the group was created because a property referenced it
    /// without a group document.
    #[serde(skip)]
    pub implicit: bool,

    #[serde(skip)]
    pub module_id: Option<ModuleId>,
}

impl PropertyTypeGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rank: 0.0,
            property_type_ids: BTreeSet::new(),
            implicit: false,
            module_id: None,
        }
    }
}

macro_rules! impl_plugin_type {
    ($($ty:ty),+) => {
        $(
            impl PluginType for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
                fn module_id(&self) -> Option<&ModuleId> {
                    self.module_id.as_ref()
                }
                fn tag_ids(&self) -> &BTreeSet<String> {
                    &self.tag_ids
                }
                fn resolved_tags(&self) -> &BTreeSet<String> {
                    &self.resolved_tags
                }
                fn set_resolved_tags(&mut self, tags: BTreeSet<String>) {
                    self.resolved_tags = tags;
                }
            }
        )+
    };
}

impl_plugin_type!(ConditionType, ActionType, ValueType, PropertyType);
