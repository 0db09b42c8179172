// evaluator.rs — ConditionEvaluator: decides whether a profile/session
// satisfies a condition tree.
//
// Evaluation dispatches on the category computed at registration time:
//
// 1. Event    → query the session's events matching `eventCondition`, then
//               either compare counts or check the "last occurrence" rule
// 2. Profile  → store.test_match against the profile
// 3. Session  → store.test_match against the session
// 4. Logical  → recurse over `subConditions`, short-circuiting
// 5. Unclassified → no match
//
// A condition that cannot be interpreted (unknown type, bad JSON, count
// that is not a number) is logged and evaluates to false. Store failures
// propagate: they say nothing about whether the condition holds.

use std::sync::Arc;

use ctx_definitions::{
    BooleanOperator, Condition, ConditionCategory, DefinitionsRegistry, RegistrySnapshot, SUB_CONDITIONS,
};
use ctx_store::{Event, Item, ItemType, PersistenceService, Profile, Session};
use serde_json::Value;

use crate::error::{ConditionParseError, EvaluationError};

/// Parameter of event conditions holding the per-event predicate.
pub const EVENT_CONDITION_PARAMETER: &str = "eventCondition";
pub const EVENT_OCCUR_IN_PARAMETER: &str = "eventOccurIn";
pub const MINIMUM_EVENT_COUNT_PARAMETER: &str = "minimumEventCount";
pub const MAXIMUM_EVENT_COUNT_PARAMETER: &str = "maximumEventCount";
pub const OPERATOR_PARAMETER: &str = "operator";

/// `eventOccurIn` value selecting the last-occurrence rule.
const OCCUR_IN_LAST: &str = "last";
const TIMESTAMP_FIELD: &str = "timeStamp";

// Store predicates used to build event queries.
const AND_PREDICATE: &str = "andCondition";
const MATCH_ALL_PREDICATE: &str = "matchAllCondition";
const PROPERTY_PREDICATE: &str = "propertyCondition";

/// The facts one evaluation runs against.
struct Facts {
    snapshot: Arc<RegistrySnapshot>,
    profile: Item,
    session: Item,
}

/// The condition evaluation engine.
///
/// Stateless apart from its collaborators; safe to share between threads
/// and to call concurrently.
pub struct ConditionEvaluator {
    registry: Arc<DefinitionsRegistry>,
    store: Arc<dyn PersistenceService>,
}

impl ConditionEvaluator {
    pub fn new(registry: Arc<DefinitionsRegistry>, store: Arc<dyn PersistenceService>) -> Self {
        Self { registry, store }
    }

    /// Parse a condition document and match it. Unparseable JSON → false.
    pub fn match_condition_json(
        &self,
        json: &str,
        profile: &Profile,
        session: &Session,
    ) -> Result<bool, EvaluationError> {
        match Condition::from_json(json) {
            Ok(condition) => self.match_condition(&condition, profile, session),
            Err(e) => {
                tracing::warn!("cannot evaluate condition document: {}", ConditionParseError::from(e));
                Ok(false)
            }
        }
    }

    /// Whether `profile` in `session` satisfies `condition`.
    ///
    /// The condition is resolved against the current registry snapshot; the
    /// whole evaluation uses that one snapshot even if modules reload
    /// meanwhile.
    pub fn match_condition(
        &self,
        condition: &Condition,
        profile: &Profile,
        session: &Session,
    ) -> Result<bool, EvaluationError> {
        let facts = Facts {
            snapshot: self.registry.snapshot(),
            profile: Item::from_entity(profile)?,
            session: Item::from_entity(session)?,
        };
        self.evaluate(condition, &facts)
    }

    fn evaluate(&self, condition: &Condition, facts: &Facts) -> Result<bool, EvaluationError> {
        let mut condition = condition.clone();
        if let Err(e) = condition.resolve(&facts.snapshot) {
            return Ok(no_match(&condition, e.into()));
        }
        let category = condition
            .condition_type
            .as_ref()
            .map(|t| t.category)
            .unwrap_or_default();

        match category {
            ConditionCategory::Event => self.match_events(&condition, facts),
            ConditionCategory::Profile => Ok(self.store.test_match(&condition, &facts.profile)?),
            ConditionCategory::Session => Ok(self.store.test_match(&condition, &facts.session)?),
            ConditionCategory::Logical => self.match_logical(&condition, facts),
            ConditionCategory::Unclassified => {
                tracing::warn!(
                    "condition type '{}' has no evaluation category, treating as no match",
                    condition.condition_type_id
                );
                Ok(false)
            }
        }
    }

    fn match_events(&self, condition: &Condition, facts: &Facts) -> Result<bool, EvaluationError> {
        let event_condition = match condition.condition_parameter(EVENT_CONDITION_PARAMETER) {
            Ok(Some(event_condition)) => event_condition,
            Ok(None) => Condition::new(MATCH_ALL_PREDICATE),
            Err(e) => return Ok(no_match(condition, e.into())),
        };
        let in_session = Condition::new(PROPERTY_PREDICATE)
            .with_parameter("propertyName", "sessionId")
            .with_parameter("comparisonOperator", "equals")
            .with_parameter("propertyValue", facts.session.item_id.clone());
        let query = Condition::new(AND_PREDICATE).with_conditions(SUB_CONDITIONS, &[event_condition, in_session.clone()]);

        let matching = self.store.query(&query, Some(TIMESTAMP_FIELD), Event::ITEM_TYPE)?;

        if condition.str_parameter(EVENT_OCCUR_IN_PARAMETER) == Some(OCCUR_IN_LAST) {
            let Some(last) = matching.last() else {
                return Ok(false);
            };
            // The most recent matching event must also be the most recent
            // event of its type in the session.
            let event_type = last.field("eventType");
            let session_events = self.store.query(&in_session, Some(TIMESTAMP_FIELD), Event::ITEM_TYPE)?;
            let latest_of_type = session_events
                .iter()
                .rev()
                .find(|event| event.field("eventType") == event_type);
            return Ok(latest_of_type.is_some_and(|event| event.item_id == last.item_id));
        }

        let bounds = count_parameter(condition, MINIMUM_EVENT_COUNT_PARAMETER, 0).and_then(|minimum| {
            count_parameter(condition, MAXIMUM_EVENT_COUNT_PARAMETER, u64::MAX).map(|maximum| (minimum, maximum))
        });
        let (minimum, maximum) = match bounds {
            Ok(bounds) => bounds,
            Err(e) => return Ok(no_match(condition, e)),
        };
        let count = matching.len() as u64;
        Ok(minimum <= count && count <= maximum)
    }

    fn match_logical(&self, condition: &Condition, facts: &Facts) -> Result<bool, EvaluationError> {
        let operator = match condition.str_parameter(OPERATOR_PARAMETER) {
            Some(raw) => match BooleanOperator::parse(raw) {
                Some(operator) => operator,
                None => return Ok(no_match(condition, ConditionParseError::Operator(raw.to_string()))),
            },
            None => condition
                .condition_type
                .as_ref()
                .and_then(|t| t.operator)
                .unwrap_or_default(),
        };
        let subs = match condition.sub_conditions() {
            Ok(subs) => subs,
            Err(e) => return Ok(no_match(condition, e.into())),
        };

        for sub in &subs {
            let matched = self.evaluate(sub, facts)?;
            match operator {
                BooleanOperator::And if !matched => return Ok(false),
                BooleanOperator::Or if matched => return Ok(true),
                _ => {}
            }
        }
        Ok(operator == BooleanOperator::And)
    }
}

fn no_match(condition: &Condition, error: ConditionParseError) -> bool {
    tracing::warn!(
        "cannot evaluate condition '{}', treating as no match: {}",
        condition.condition_type_id,
        error
    );
    false
}

/// An event count bound. Missing or empty → `default`; numbers may be given
/// as JSON integers or strings.
fn count_parameter(condition: &Condition, name: &str, default: u64) -> Result<u64, ConditionParseError> {
    let invalid = |value: &Value| ConditionParseError::Count {
        parameter: name.to_string(),
        value: value.to_string(),
    };
    match condition.parameter(name) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
        Some(value @ Value::String(s)) => s.trim().parse().map_err(|_| invalid(value)),
        Some(value @ Value::Number(n)) => n.as_u64().ok_or_else(|| invalid(value)),
        Some(other) => Err(invalid(other)),
    }
}
