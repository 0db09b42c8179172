// rule.rs — Rules compiled from goals and the rule collaborator interface.
//
// Rules are fired by an external rule engine; this crate only produces and
// retracts them. `StoreRuleService` keeps them as `rule` items in the store.

use std::sync::Arc;

use ctx_definitions::{ActionType, Condition};
use ctx_store::{Item, ItemType, PersistenceService};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GoalError;
use crate::goal::Metadata;

/// One action of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type", alias = "actionTypeId")]
    pub action_type_id: String,

    #[serde(default)]
    pub parameter_values: Map<String, Value>,

    #[serde(skip)]
    pub action_type: Option<Arc<ActionType>>,
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.action_type_id == other.action_type_id && self.parameter_values == other.parameter_values
    }
}

impl Action {
    /// An action of a registered type.
    pub fn of_type(action_type: Arc<ActionType>) -> Self {
        Self {
            action_type_id: action_type.id.clone(),
            parameter_values: Map::new(),
            action_type: Some(action_type),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameter_values.insert(name.into(), value.into());
        self
    }
}

/// A condition-triggered list of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub metadata: Metadata,
    pub condition: Condition,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}

impl ItemType for Rule {
    const ITEM_TYPE: &'static str = "rule";

    fn item_id(&self) -> &str {
        &self.metadata.id
    }
}

/// Where compiled rules go.
pub trait RuleService: Send + Sync {
    /// Create or replace a rule.
    fn set_rule(&self, rule: &Rule) -> Result<(), GoalError>;

    /// Retract a rule. Returns whether it existed; retracting twice is fine.
    fn remove_rule(&self, rule_id: &str) -> Result<bool, GoalError>;

    fn get_rule(&self, rule_id: &str) -> Result<Option<Rule>, GoalError>;

    fn get_all_rules(&self) -> Result<Vec<Rule>, GoalError>;
}

/// Rules persisted as `rule` items.
pub struct StoreRuleService {
    store: Arc<dyn PersistenceService>,
}

impl StoreRuleService {
    pub fn new(store: Arc<dyn PersistenceService>) -> Self {
        Self { store }
    }
}

impl RuleService for StoreRuleService {
    fn set_rule(&self, rule: &Rule) -> Result<(), GoalError> {
        tracing::debug!("saving rule '{}'", rule.id());
        self.store.save(&Item::from_entity(rule)?)?;
        Ok(())
    }

    fn remove_rule(&self, rule_id: &str) -> Result<bool, GoalError> {
        let removed = self.store.remove(Rule::ITEM_TYPE, rule_id)?;
        if removed {
            tracing::debug!("retracted rule '{}'", rule_id);
        }
        Ok(removed)
    }

    fn get_rule(&self, rule_id: &str) -> Result<Option<Rule>, GoalError> {
        match self.store.load(Rule::ITEM_TYPE, rule_id)? {
            Some(item) => Ok(Some(item.to_entity()?)),
            None => Ok(None),
        }
    }

    fn get_all_rules(&self) -> Result<Vec<Rule>, GoalError> {
        let mut rules = Vec::new();
        for item in self.store.get_all_items(Rule::ITEM_TYPE)? {
            rules.push(item.to_entity()?);
        }
        Ok(rules)
    }
}
