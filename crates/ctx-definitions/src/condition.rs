// condition.rs — Instantiated predicate trees.
//
// A Condition names its condition type by id and carries free-form
// parameter values. Composite conditions keep their children inside the
// parameters (`subConditions`, `subCondition`, `eventCondition`) as plain
// condition documents, so a Condition round-trips through JSON unchanged.
// The condition type itself is resolved lazily against a registry snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DefinitionError;
use crate::registry::RegistrySnapshot;
use crate::types::ConditionType;

/// Parameter holding the children of a logical condition.
pub const SUB_CONDITIONS: &str = "subConditions";

/// A predicate instance: a condition type plus parameter values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type", alias = "conditionTypeId")]
    pub condition_type_id: String,

    #[serde(default)]
    pub parameter_values: Map<String, Value>,

    /// Resolved type; filled by [`Condition::resolve`].
    #[serde(skip)]
    pub condition_type: Option<Arc<ConditionType>>,
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.condition_type_id == other.condition_type_id
            && self.parameter_values == other.parameter_values
    }
}

impl Condition {
    pub fn new(condition_type_id: impl Into<String>) -> Self {
        Self {
            condition_type_id: condition_type_id.into(),
            parameter_values: Map::new(),
            condition_type: None,
        }
    }

    /// Parse a condition from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse a condition from an already-decoded JSON value.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Condition::deserialize(value)
    }

    pub fn to_value(&self) -> Value {
        // Serializing a string key map with JSON values cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_parameter(name, value);
        self
    }

    /// Store child conditions under a parameter.
    pub fn with_conditions(mut self, name: impl Into<String>, conditions: &[Condition]) -> Self {
        let values = conditions.iter().map(Condition::to_value).collect();
        self.parameter_values.insert(name.into(), Value::Array(values));
        self
    }

    /// Store a single child condition under a parameter.
    pub fn with_condition(mut self, name: impl Into<String>, condition: &Condition) -> Self {
        self.parameter_values.insert(name.into(), condition.to_value());
        self
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameter_values.insert(name.into(), value.into());
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameter_values.get(name)
    }

    /// A string parameter; missing or non-string → None.
    pub fn str_parameter(&self, name: &str) -> Option<&str> {
        self.parameter(name).and_then(Value::as_str)
    }

    /// Parse the conditions stored under `name` (array or single object).
    /// A missing parameter yields an empty list.
    pub fn conditions_parameter(&self, name: &str) -> Result<Vec<Condition>, DefinitionError> {
        match self.parameter(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().map(parse_nested).collect(),
            Some(value @ Value::Object(_)) => Ok(vec![parse_nested(value)?]),
            Some(other) => Err(DefinitionError::MalformedCondition(format!(
                "parameter '{}' of '{}' is not a condition: {}",
                name, self.condition_type_id, other
            ))),
        }
    }

    /// The single condition stored under `name`, if any.
    pub fn condition_parameter(&self, name: &str) -> Result<Option<Condition>, DefinitionError> {
        Ok(self.conditions_parameter(name)?.into_iter().next())
    }

    /// Children of a logical condition.
    pub fn sub_conditions(&self) -> Result<Vec<Condition>, DefinitionError> {
        self.conditions_parameter(SUB_CONDITIONS)
    }

    /// Every condition type id referenced by this tree, including nested
    /// conditions found anywhere in the parameters.
    pub fn condition_type_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        ids.insert(self.condition_type_id.clone());
        for value in self.parameter_values.values() {
            collect_nested_type_ids(value, &mut ids);
        }
        ids
    }

    /// Whether the tree references any of `type_ids`.
    pub fn references_any(&self, type_ids: &BTreeSet<String>) -> bool {
        !self.condition_type_ids().is_disjoint(type_ids)
    }

    /// Resolve this condition's type against a registry snapshot, verifying
    /// that every nested condition type is registered too. Idempotent.
    pub fn resolve(&mut self, registry: &RegistrySnapshot) -> Result<(), DefinitionError> {
        for id in self.condition_type_ids() {
            if registry.get_condition_type(&id).is_none() {
                return Err(DefinitionError::UnknownConditionType(id));
            }
        }
        self.condition_type = registry.get_condition_type(&self.condition_type_id);
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.condition_type.is_some()
    }
}

fn parse_nested(value: &Value) -> Result<Condition, DefinitionError> {
    Condition::from_value(value).map_err(|e| DefinitionError::MalformedCondition(e.to_string()))
}

/// A JSON object that looks like a condition document.
fn as_condition_document(value: &Value) -> Option<(&str, &Map<String, Value>)> {
    let object = value.as_object()?;
    let type_id = object
        .get("type")
        .or_else(|| object.get("conditionTypeId"))?
        .as_str()?;
    let params = object.get("parameterValues")?.as_object()?;
    Some((type_id, params))
}

fn collect_nested_type_ids(value: &Value, ids: &mut BTreeSet<String>) {
    if let Some((type_id, params)) = as_condition_document(value) {
        ids.insert(type_id.to_string());
        for nested in params.values() {
            collect_nested_type_ids(nested, ids);
        }
    } else if let Value::Array(items) = value {
        for item in items {
            collect_nested_type_ids(item, ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page_view() -> Condition {
        Condition::new("eventTypeCondition").with_parameter("eventTypeId", "view")
    }

    #[test]
    fn parses_document_shape() {
        let json = r#"{
            "type": "booleanCondition",
            "parameterValues": {
                "operator": "and",
                "subConditions": [
                    {"type": "profilePropertyCondition", "parameterValues": {"propertyName": "age"}},
                    {"type": "sessionPropertyCondition", "parameterValues": {}}
                ]
            }
        }"#;
        let condition = Condition::from_json(json).unwrap();
        assert_eq!(condition.condition_type_id, "booleanCondition");
        assert_eq!(condition.str_parameter("operator"), Some("and"));
        assert_eq!(condition.sub_conditions().unwrap().len(), 2);
        assert!(!condition.is_resolved());
    }

    #[test]
    fn collects_nested_type_ids() {
        let inner = Condition::new("andCondition").with_conditions("subConditions", &[page_view()]);
        let outer = Condition::new("sessionEventCondition").with_condition("eventCondition", &inner);

        let ids = outer.condition_type_ids();
        let expected: BTreeSet<String> = ["sessionEventCondition", "andCondition", "eventTypeCondition"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn plain_objects_are_not_conditions() {
        let condition = Condition::new("propertyCondition")
            .with_parameter("propertyValue", json!({"type": "x", "other": 1}));
        assert_eq!(condition.condition_type_ids().len(), 1);
    }

    #[test]
    fn malformed_sub_conditions_are_reported() {
        let condition = Condition::new("andCondition").with_parameter("subConditions", 5);
        assert!(matches!(
            condition.sub_conditions(),
            Err(DefinitionError::MalformedCondition(_))
        ));
    }

    #[test]
    fn missing_sub_conditions_is_empty() {
        assert!(Condition::new("andCondition").sub_conditions().unwrap().is_empty());
    }

    #[test]
    fn equality_ignores_resolution() {
        let a = page_view();
        let mut b = page_view();
        b.condition_type = Some(Arc::new(ConditionType::new("eventTypeCondition")));
        assert_eq!(a, b);
    }
}
