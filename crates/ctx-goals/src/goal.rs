// goal.rs — Goal: a named funnel from a start condition to a target condition.
//
// Goals are persisted as `goal` items. While a goal is enabled, two hidden
// rules stamp `<goalId>.start.reached` / `<goalId>.target.reached` on the
// session whenever the respective condition matches; the funnel report
// counts sessions carrying those stamps.

use std::collections::BTreeSet;

use ctx_definitions::Condition;
use ctx_store::ItemType;
use serde::{Deserialize, Serialize};

/// Descriptive metadata shared by goals and rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub hidden: bool,

    /// Module that shipped this goal as a predefined definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Metadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            enabled: true,
            hidden: false,
            module_id: None,
        }
    }
}

/// A conversion goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub metadata: Metadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_event: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_event: Option<Condition>,
}

impl Goal {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            start_event: None,
            target_event: None,
        }
    }

    pub fn with_start_event(mut self, condition: Condition) -> Self {
        self.start_event = Some(condition);
        self
    }

    pub fn with_target_event(mut self, condition: Condition) -> Self {
        self.target_event = Some(condition);
        self
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Every condition type id referenced by the start and target trees.
    pub fn condition_type_ids(&self) -> BTreeSet<String> {
        self.events()
            .flat_map(|(_, condition)| condition.condition_type_ids())
            .collect()
    }

    /// Whether either condition tree references any of `type_ids`.
    pub fn references_any(&self, type_ids: &BTreeSet<String>) -> bool {
        self.events().any(|(_, condition)| condition.references_any(type_ids))
    }

    /// The present conditions, labelled with their funnel step.
    pub(crate) fn events(&self) -> impl Iterator<Item = (FunnelStep, &Condition)> {
        [
            (FunnelStep::Start, self.start_event.as_ref()),
            (FunnelStep::Target, self.target_event.as_ref()),
        ]
        .into_iter()
        .filter_map(|(step, condition)| condition.map(|c| (step, c)))
    }

    pub(crate) fn events_mut(&mut self) -> impl Iterator<Item = &mut Condition> {
        self.start_event.iter_mut().chain(self.target_event.iter_mut())
    }
}

impl ItemType for Goal {
    const ITEM_TYPE: &'static str = "goal";

    fn item_id(&self) -> &str {
        &self.metadata.id
    }
}

/// The two steps of a goal funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunnelStep {
    Start,
    Target,
}

impl FunnelStep {
    pub const ALL: [FunnelStep; 2] = [FunnelStep::Start, FunnelStep::Target];

    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStep::Start => "start",
            FunnelStep::Target => "target",
        }
    }

    /// Id of the rule compiled for this step of `goal_id`.
    pub fn rule_id(&self, goal_id: &str) -> String {
        format!("{}.{}Event", goal_id, self.as_str())
    }

    /// Session property stamped when this step is reached.
    pub fn reached_property(&self, goal_id: &str) -> String {
        format!("{}.{}.reached", goal_id, self.as_str())
    }
}
