// predicate.rs — Built-in condition predicates for in-process matching.
//
// A store executes conditions by predicate name: the `conditionEvaluator`
// of the condition type, or the type id when none is declared. The names
// below are the predicates `MemoryStore` understands; anything else is
// `StoreError::UnsupportedCondition`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use ctx_definitions::{Condition, RegistrySnapshot};
use serde_json::Value;

use crate::error::StoreError;
use crate::item::Item;

const PROPERTY_VALUE_PARAMETERS: [&str; 3] = ["propertyValue", "propertyValueInteger", "propertyValueDate"];

/// Interprets condition trees against single items.
pub struct Predicates<'a> {
    registry: Option<&'a RegistrySnapshot>,
}

impl<'a> Predicates<'a> {
    /// `registry` is consulted for the evaluator name of unresolved
    /// conditions (typically nested ones parsed from parameters).
    pub fn new(registry: Option<&'a RegistrySnapshot>) -> Self {
        Self { registry }
    }

    /// Predicate name of a condition.
    pub fn evaluator_of(&self, condition: &Condition) -> String {
        if let Some(condition_type) = &condition.condition_type {
            return condition_type.evaluator().to_string();
        }
        self.registry
            .and_then(|r| r.get_condition_type(&condition.condition_type_id))
            .map(|t| t.evaluator().to_string())
            .unwrap_or_else(|| condition.condition_type_id.clone())
    }

    pub fn matches(&self, condition: &Condition, item: &Item) -> Result<bool, StoreError> {
        match self.evaluator_of(condition).as_str() {
            "matchAllCondition" => Ok(true),
            "andCondition" => self.all(condition, item),
            "orCondition" => self.any(condition, item),
            "booleanCondition" => match condition.str_parameter("operator").unwrap_or("and") {
                op if op.eq_ignore_ascii_case("or") => self.any(condition, item),
                op if op.eq_ignore_ascii_case("and") => self.all(condition, item),
                op => Err(invalid(condition, format!("unknown operator '{}'", op))),
            },
            "notCondition" => {
                let inner = condition
                    .condition_parameter("subCondition")
                    .map_err(|e| invalid(condition, e.to_string()))?
                    .ok_or_else(|| invalid(condition, "missing subCondition".to_string()))?;
                Ok(!self.matches(&inner, item)?)
            }
            "propertyCondition"
            | "profilePropertyCondition"
            | "sessionPropertyCondition"
            | "eventPropertyCondition" => property_matches(condition, item),
            "eventTypeCondition" => {
                let expected = condition
                    .str_parameter("eventTypeId")
                    .ok_or_else(|| invalid(condition, "missing eventTypeId".to_string()))?;
                Ok(item.field("eventType").and_then(Value::as_str) == Some(expected))
            }
            "profileSegmentCondition" => {
                let wanted = string_list(condition.parameter("segments"));
                let segments = item.field("segments").and_then(Value::as_array);
                Ok(segments.is_some_and(|s| s.iter().filter_map(Value::as_str).any(|s| wanted.iter().any(|w| w == s))))
            }
            "goalMatchCondition" => goal_matches(condition, item),
            other => Err(StoreError::UnsupportedCondition(other.to_string())),
        }
    }

    fn all(&self, condition: &Condition, item: &Item) -> Result<bool, StoreError> {
        for sub in sub_conditions(condition)? {
            if !self.matches(&sub, item)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn any(&self, condition: &Condition, item: &Item) -> Result<bool, StoreError> {
        for sub in sub_conditions(condition)? {
            if self.matches(&sub, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn invalid(condition: &Condition, reason: String) -> StoreError {
    StoreError::InvalidCondition {
        condition_type: condition.condition_type_id.clone(),
        reason,
    }
}

fn sub_conditions(condition: &Condition) -> Result<Vec<Condition>, StoreError> {
    condition.sub_conditions().map_err(|e| invalid(condition, e.to_string()))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

fn goal_matches(condition: &Condition, item: &Item) -> Result<bool, StoreError> {
    let goal_id = condition
        .str_parameter("goalId")
        .ok_or_else(|| invalid(condition, "missing goalId".to_string()))?;
    let reached = match condition.parameter("goalReached") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let started = is_present(item.field(&format!("properties.{}.start.reached", goal_id)));
    if !reached {
        return Ok(started);
    }
    Ok(started && is_present(item.field(&format!("properties.{}.target.reached", goal_id))))
}

fn property_matches(condition: &Condition, item: &Item) -> Result<bool, StoreError> {
    let name = condition
        .str_parameter("propertyName")
        .ok_or_else(|| invalid(condition, "missing propertyName".to_string()))?;
    let operator = condition.str_parameter("comparisonOperator").unwrap_or("equals");
    let actual = item.field_value(name);
    let expected = PROPERTY_VALUE_PARAMETERS
        .iter()
        .find_map(|p| condition.parameter(p).filter(|v| !v.is_null()));
    let values: Vec<Value> = match condition.parameter("propertyValues") {
        Some(Value::Array(values)) => values.clone(),
        _ => Vec::new(),
    };

    let actual = match (operator, actual) {
        ("exists", actual) => return Ok(is_present(actual.as_ref())),
        ("missing", actual) => return Ok(!is_present(actual.as_ref())),
        ("notEquals", None) | ("notIn", None) => return Ok(true),
        (_, None) | (_, Some(Value::Null)) => return Ok(false),
        (_, Some(actual)) => actual,
    };
    // Multi-valued properties match when any element does.
    let candidates: Vec<&Value> = match &actual {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    let require = || expected.ok_or_else(|| invalid(condition, format!("'{}' needs a property value", operator)));

    let result = match operator {
        "equals" => {
            let expected = require()?;
            candidates.iter().any(|a| values_equal(a, expected))
        }
        "notEquals" => {
            let expected = require()?;
            !candidates.iter().any(|a| values_equal(a, expected))
        }
        "greaterThan" | "greaterThanOrEqualTo" | "lessThan" | "lessThanOrEqualTo" => {
            let expected = require()?;
            candidates.iter().any(|a| {
                compare_values(a, expected).is_some_and(|ord| match operator {
                    "greaterThan" => ord == Ordering::Greater,
                    "greaterThanOrEqualTo" => ord != Ordering::Less,
                    "lessThan" => ord == Ordering::Less,
                    _ => ord != Ordering::Greater,
                })
            })
        }
        "between" => {
            let (low, high) = match values.as_slice() {
                [low, high] => (low, high),
                _ => return Err(invalid(condition, "'between' needs two propertyValues".to_string())),
            };
            candidates.iter().any(|a| {
                compare_values(a, low).is_some_and(|o| o != Ordering::Less)
                    && compare_values(a, high).is_some_and(|o| o != Ordering::Greater)
            })
        }
        "contains" | "startsWith" | "endsWith" => {
            let expected = require()?;
            let needle = value_text(expected);
            match &actual {
                Value::Array(items) => items.iter().any(|a| values_equal(a, expected)),
                other => {
                    let text = value_text(other);
                    match operator {
                        "contains" => text.contains(&needle),
                        "startsWith" => text.starts_with(&needle),
                        _ => text.ends_with(&needle),
                    }
                }
            }
        }
        "in" => candidates.iter().any(|a| values.iter().any(|v| values_equal(a, v))),
        "notIn" => !candidates.iter().any(|a| values.iter().any(|v| values_equal(a, v))),
        other => return Err(invalid(condition, format!("unknown comparison operator '{}'", other))),
    };
    Ok(result)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A timestamp field value: RFC 3339 string or epoch milliseconds.
pub(crate) fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose equality: numbers compare numerically, numeric strings equal
/// their numbers, everything else compares structurally.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => {
            s.eq_ignore_ascii_case(if *x { "true" } else { "false" })
        }
        _ => false,
    }
}

/// Ordering of two field values: numbers numerically, RFC 3339 strings as
/// instants, other strings lexically. None when incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            if let (Some(x), Some(y)) = (parse_time(a), parse_time(b)) {
                return Some(x.cmp(&y));
            }
            match (x.trim().parse::<f64>(), y.trim().parse::<f64>()) {
                (Ok(x), Ok(y)) => x.partial_cmp(&y),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}
