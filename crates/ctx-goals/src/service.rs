// service.rs — GoalsService: goal persistence, rule compilation and reports.
//
// Saving an enabled goal with both events compiles two hidden rules, one per
// funnel step, that stamp `<goalId>.<step>.reached` on the session. Disabling
// a goal, or saving it without one of its events, retracts them. Reports
// count sessions carrying those stamps through the store's aggregate queries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ctx_definitions::{Condition, DefinitionsRegistry, ModuleId, ModuleSource, Namespace, SUB_CONDITIONS};
use ctx_store::{Aggregate, BucketCounts, DateInterval, Item, ItemType, PersistenceService, FILTERED_COUNT_KEY};
use serde::Deserialize;

use crate::error::GoalError;
use crate::goal::{FunnelStep, Goal, Metadata};
use crate::report::{GoalReport, SESSION_CREATION_DATE_SPLIT};
use crate::rule::{Action, Rule, RuleService};

/// Item type the funnel reports query.
const SESSION_ITEM_TYPE: &str = "session";

/// Names the goal subsystem relies on. All of them are configurable because
/// they refer to definitions shipped by modules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GoalsSettings {
    /// Action type of the compiled goal rules.
    pub set_property_action: String,
    /// Condition type matching sessions by goal progress.
    pub goal_match_condition: String,
    /// Condition type combining the report filter with the goal match.
    pub and_condition: String,
    /// Session field bucketed by the `sessionCreationDate` split.
    pub session_date_field: String,
    pub date_interval: DateInterval,
}

impl Default for GoalsSettings {
    fn default() -> Self {
        Self {
            set_property_action: "setPropertyAction".to_string(),
            goal_match_condition: "goalMatchCondition".to_string(),
            and_condition: "andCondition".to_string(),
            session_date_field: "timeStamp".to_string(),
            date_interval: DateInterval::default(),
        }
    }
}

/// A predefined goal waiting for definitions from a module not loaded yet.
#[derive(Debug, Clone)]
struct PendingGoal {
    module_id: ModuleId,
    origin: String,
    goal: Goal,
}

/// The goal engine.
pub struct GoalsService {
    registry: Arc<DefinitionsRegistry>,
    store: Arc<dyn PersistenceService>,
    rules: Arc<dyn RuleService>,
    settings: GoalsSettings,
    /// Predefined goals keyed by goal id.
    pending: Mutex<BTreeMap<String, PendingGoal>>,
}

impl GoalsService {
    pub fn new(
        registry: Arc<DefinitionsRegistry>,
        store: Arc<dyn PersistenceService>,
        rules: Arc<dyn RuleService>,
    ) -> Self {
        Self {
            registry,
            store,
            rules,
            settings: GoalsSettings::default(),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_settings(mut self, settings: GoalsSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &GoalsSettings {
        &self.settings
    }

    /// Create or replace a goal.
    ///
    /// The goal's id is forced to `goal_id`. Every condition type referenced
    /// by its events must be registered; otherwise nothing is written.
    pub fn set_goal(&self, goal_id: &str, mut goal: Goal) -> Result<(), GoalError> {
        goal.metadata.id = goal_id.to_string();

        let snapshot = self.registry.snapshot();
        for condition in goal.events_mut() {
            condition
                .resolve(&snapshot)
                .map_err(|source| GoalError::UnresolvedCondition {
                    goal_id: goal_id.to_string(),
                    source,
                })?;
        }

        if goal.metadata.enabled && goal.start_event.is_some() && goal.target_event.is_some() {
            let action_type = snapshot
                .get_action_type(&self.settings.set_property_action)
                .ok_or_else(|| GoalError::MissingActionType(self.settings.set_property_action.clone()))?;
            for (step, condition) in goal.events() {
                let rule = Rule {
                    metadata: Metadata {
                        hidden: true,
                        ..Metadata::new(
                            step.rule_id(goal_id),
                            format!("Auto generated rule for goal {}", goal.metadata.name),
                            "",
                        )
                    },
                    condition: condition.clone(),
                    actions: vec![Action::of_type(action_type.clone())
                        .with_parameter("setPropertyName", step.reached_property(goal_id))
                        .with_parameter("setPropertyValue", "now")
                        .with_parameter("storeInSession", true)],
                };
                self.rules.set_rule(&rule)?;
            }
        } else {
            self.retract_rules(goal_id)?;
        }

        self.store.save(&Item::from_entity(&goal)?)?;
        tracing::info!("saved goal '{}' (enabled: {})", goal_id, goal.metadata.enabled);
        Ok(())
    }

    /// Create an empty goal. Without events it compiles no rules.
    pub fn create_goal(&self, goal_id: &str, name: &str, description: &str) -> Result<(), GoalError> {
        self.set_goal(goal_id, Goal::new(Metadata::new(goal_id, name, description)))
    }

    /// Load a goal, resolving its conditions when possible.
    pub fn get_goal(&self, goal_id: &str) -> Result<Option<Goal>, GoalError> {
        let Some(item) = self.store.load(Goal::ITEM_TYPE, goal_id)? else {
            return Ok(None);
        };
        let mut goal: Goal = item.to_entity()?;
        let snapshot = self.registry.snapshot();
        for condition in goal.events_mut() {
            if let Err(e) = condition.resolve(&snapshot) {
                tracing::warn!("goal '{}' loaded with an unresolved condition: {}", goal_id, e);
            }
        }
        Ok(Some(goal))
    }

    /// Metadata of every stored goal, ordered by id.
    pub fn get_goal_metadatas(&self) -> Result<Vec<Metadata>, GoalError> {
        let mut metadatas = self
            .all_goals()?
            .into_iter()
            .map(|goal| goal.metadata)
            .collect::<Vec<_>>();
        metadatas.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(metadatas)
    }

    /// Delete a goal and retract its rules. Returns whether the goal existed.
    pub fn remove_goal(&self, goal_id: &str) -> Result<bool, GoalError> {
        self.retract_rules(goal_id)?;
        let removed = self.store.remove(Goal::ITEM_TYPE, goal_id)?;
        if removed {
            tracing::info!("removed goal '{}'", goal_id);
        }
        Ok(removed)
    }

    /// Install the goals a module ships under its `goals` namespace.
    ///
    /// Goals already in the store are left alone. Malformed documents are
    /// logged and skipped. Goals referencing condition or action types that
    /// are not registered yet are kept pending and retried on every later
    /// call, so a goal module may be activated before the module providing
    /// its types. Returns the ids installed by this call, pending ones
    /// included.
    pub fn load_predefined_goals(&self, module: &dyn ModuleSource) -> Result<Vec<String>, GoalError> {
        let module_id = module.module_id();
        self.forget_predefined_goals(&module_id);
        let documents = match module.documents(Namespace::Goals) {
            Ok(documents) => documents,
            Err(e) => {
                tracing::error!("cannot list goals of module '{}': {}", module_id, e);
                Vec::new()
            }
        };

        let mut candidates = Vec::new();
        for document in documents {
            let mut goal: Goal = match serde_json::from_str(&document.content) {
                Ok(goal) => goal,
                Err(e) => {
                    tracing::error!("error while loading goal definition {}: {}", document.origin, e);
                    continue;
                }
            };
            goal.metadata.module_id = Some(module_id.as_str().to_string());
            candidates.push(PendingGoal {
                module_id: module_id.clone(),
                origin: document.origin,
                goal,
            });
        }
        let waiting: Vec<PendingGoal> = self.pending_guard().values().cloned().collect();
        candidates.extend(waiting);

        let mut installed = Vec::new();
        for candidate in candidates {
            let goal_id = candidate.goal.metadata.id.clone();
            if self.install_predefined_goal(candidate)? {
                installed.push(goal_id);
            }
        }
        installed.sort();
        Ok(installed)
    }

    /// Drop the pending predefined goals of a module.
    pub fn forget_predefined_goals(&self, module_id: &ModuleId) {
        self.pending_guard().retain(|_, p| &p.module_id != module_id);
    }

    /// Ids of predefined goals waiting for definitions.
    pub fn pending_goal_ids(&self) -> Vec<String> {
        self.pending_guard().keys().cloned().collect()
    }

    fn pending_guard(&self) -> MutexGuard<'_, BTreeMap<String, PendingGoal>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the goal was installed. Goals that cannot resolve yet are
    /// parked in `pending`.
    fn install_predefined_goal(&self, candidate: PendingGoal) -> Result<bool, GoalError> {
        let goal_id = candidate.goal.metadata.id.clone();
        if self.store.load(Goal::ITEM_TYPE, &goal_id)?.is_some() {
            tracing::debug!("goal '{}' already exists, keeping stored version", goal_id);
            self.pending_guard().remove(&goal_id);
            return Ok(false);
        }
        match self.set_goal(&goal_id, candidate.goal.clone()) {
            Ok(()) => {
                self.pending_guard().remove(&goal_id);
                Ok(true)
            }
            Err(GoalError::Store(e)) => Err(GoalError::Store(e)),
            Err(e @ (GoalError::UnresolvedCondition { .. } | GoalError::MissingActionType(_))) => {
                tracing::info!("predefined goal from {} is pending: {}", candidate.origin, e);
                self.pending_guard().insert(goal_id, candidate);
                Ok(false)
            }
            Err(e) => {
                tracing::error!("cannot install predefined goal from {}: {}", candidate.origin, e);
                self.pending_guard().remove(&goal_id);
                Ok(false)
            }
        }
    }

    /// Disable every enabled goal whose events reference one of
    /// `condition_type_ids`, retracting its rules. Returns the disabled ids.
    ///
    /// The goals are saved as-is: their conditions no longer resolve.
    pub fn disable_goals_using(&self, condition_type_ids: &BTreeSet<String>) -> Result<Vec<String>, GoalError> {
        if condition_type_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut disabled = Vec::new();
        for mut goal in self.all_goals()? {
            if !goal.metadata.enabled || !goal.references_any(condition_type_ids) {
                continue;
            }
            goal.metadata.enabled = false;
            self.retract_rules(goal.id())?;
            self.store.save(&Item::from_entity(&goal)?)?;
            tracing::warn!("disabled goal '{}': it references unloaded condition types", goal.id());
            disabled.push(goal.metadata.id);
        }
        disabled.sort();
        Ok(disabled)
    }

    /// Funnel report of a goal.
    ///
    /// `split` selects the bucketing: none (global counts only),
    /// `sessionCreationDate` (date buckets of the session timestamp) or any
    /// other session field (one bucket per value). `filter` narrows both
    /// populations.
    pub fn get_goal_report(
        &self,
        goal_id: &str,
        split: Option<&str>,
        filter: Option<&Condition>,
    ) -> Result<GoalReport, GoalError> {
        let start = self.population(goal_id, false, filter, split)?;
        let target = self.population(goal_id, true, filter, split)?;
        Ok(GoalReport::from_counts(start, target))
    }

    fn population(
        &self,
        goal_id: &str,
        reached: bool,
        filter: Option<&Condition>,
        split: Option<&str>,
    ) -> Result<BucketCounts, GoalError> {
        let goal_match = Condition::new(&self.settings.goal_match_condition)
            .with_parameter("goalId", goal_id)
            .with_parameter("goalReached", reached);
        let condition = match filter {
            Some(filter) => Condition::new(&self.settings.and_condition)
                .with_conditions(SUB_CONDITIONS, &[goal_match, filter.clone()]),
            None => goal_match,
        };

        let counts = match split {
            None => {
                let count = self.store.query_count(&condition, SESSION_ITEM_TYPE)?;
                vec![(FILTERED_COUNT_KEY.to_string(), count)]
            }
            Some(SESSION_CREATION_DATE_SPLIT) => self.store.aggregate_query(
                &condition,
                &Aggregate::date(&self.settings.session_date_field, self.settings.date_interval),
                SESSION_ITEM_TYPE,
            )?,
            Some(field) => self
                .store
                .aggregate_query(&condition, &Aggregate::terms(field), SESSION_ITEM_TYPE)?,
        };
        Ok(counts)
    }

    fn retract_rules(&self, goal_id: &str) -> Result<(), GoalError> {
        for step in FunnelStep::ALL {
            self.rules.remove_rule(&step.rule_id(goal_id))?;
        }
        Ok(())
    }

    fn all_goals(&self) -> Result<Vec<Goal>, GoalError> {
        let mut goals = Vec::new();
        for item in self.store.get_all_items(Goal::ITEM_TYPE)? {
            goals.push(item.to_entity()?);
        }
        Ok(goals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::StoreRuleService;
    use chrono::{TimeZone, Utc};
    use ctx_definitions::{ActionType, ConditionType, StaticModule};
    use ctx_store::{MemoryStore, Session, StoreError};

    struct Fixture {
        registry: Arc<DefinitionsRegistry>,
        store: Arc<MemoryStore>,
        rules: Arc<StoreRuleService>,
        goals: GoalsService,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(DefinitionsRegistry::new());
        for id in [
            "pageViewCondition",
            "formEventCondition",
            "goalMatchCondition",
            "andCondition",
            "sessionPropertyCondition",
        ] {
            registry.register_condition_type(ConditionType::new(id));
        }
        registry.register_action_type(ActionType::new("setPropertyAction"));

        let store = Arc::new(MemoryStore::new().with_registry(registry.clone()));
        let rules = Arc::new(StoreRuleService::new(store.clone()));
        let goals = GoalsService::new(registry.clone(), store.clone(), rules.clone());
        Fixture {
            registry,
            store,
            rules,
            goals,
        }
    }

    fn funnel_goal(id: &str) -> Goal {
        Goal::new(Metadata::new(id, "Sign up", ""))
            .with_start_event(Condition::new("pageViewCondition").with_parameter("pagePath", "/signup"))
            .with_target_event(Condition::new("formEventCondition").with_parameter("formId", "signup"))
    }

    fn session(id: &str, day: u32, properties: &[(&str, &str)]) -> Item {
        let mut session = Session::new(id, "p1", Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap());
        for (name, value) in properties {
            session = session.with_property(*name, *value);
        }
        Item::from_entity(&session).unwrap()
    }

    #[test]
    fn enabled_goal_compiles_hidden_rules() {
        let f = fixture();
        f.goals.set_goal("signup", funnel_goal("ignored")).unwrap();

        let start = f.rules.get_rule("signup.startEvent").unwrap().unwrap();
        assert!(start.metadata.hidden);
        assert_eq!(start.metadata.name, "Auto generated rule for goal Sign up");
        assert_eq!(start.condition.condition_type_id, "pageViewCondition");
        let action = &start.actions[0];
        assert_eq!(action.action_type_id, "setPropertyAction");
        assert_eq!(action.parameter_values["setPropertyName"], "signup.start.reached");
        assert_eq!(action.parameter_values["setPropertyValue"], "now");
        assert_eq!(action.parameter_values["storeInSession"], true);

        let target = f.rules.get_rule("signup.targetEvent").unwrap().unwrap();
        assert_eq!(target.actions[0].parameter_values["setPropertyName"], "signup.target.reached");

        let stored = f.goals.get_goal("signup").unwrap().unwrap();
        assert_eq!(stored.id(), "signup");
        assert!(stored.start_event.as_ref().unwrap().is_resolved());
    }

    #[test]
    fn disabling_a_goal_retracts_its_rules() {
        let f = fixture();
        f.goals.set_goal("signup", funnel_goal("signup")).unwrap();
        assert_eq!(f.rules.get_all_rules().unwrap().len(), 2);

        let mut goal = funnel_goal("signup");
        goal.metadata.enabled = false;
        f.goals.set_goal("signup", goal.clone()).unwrap();
        assert!(f.rules.get_all_rules().unwrap().is_empty());

        // Saving it disabled again is harmless.
        f.goals.set_goal("signup", goal).unwrap();
        assert!(!f.goals.get_goal("signup").unwrap().unwrap().metadata.enabled);
    }

    #[test]
    fn goal_without_events_has_no_rules() {
        let f = fixture();
        f.goals.create_goal("empty", "Empty", "no events yet").unwrap();
        assert!(f.rules.get_all_rules().unwrap().is_empty());
        let metadatas = f.goals.get_goal_metadatas().unwrap();
        assert_eq!(metadatas.len(), 1);
        assert_eq!(metadatas[0].description, "no events yet");
    }

    #[test]
    fn unresolvable_condition_rejects_the_goal() {
        let f = fixture();
        let goal = Goal::new(Metadata::new("g", "G", ""))
            .with_start_event(Condition::new("pageViewCondition"))
            .with_target_event(Condition::new("unknownCondition"));
        let err = f.goals.set_goal("g", goal).unwrap_err();
        assert!(matches!(err, GoalError::UnresolvedCondition { ref goal_id, .. } if goal_id == "g"));
        assert!(f.goals.get_goal("g").unwrap().is_none());
        assert!(f.rules.get_all_rules().unwrap().is_empty());
    }

    #[test]
    fn missing_action_type_is_reported() {
        let f = fixture();
        let goals = GoalsService::new(f.registry.clone(), f.store.clone(), f.rules.clone()).with_settings(
            GoalsSettings {
                set_property_action: "noSuchAction".to_string(),
                ..GoalsSettings::default()
            },
        );
        let err = goals.set_goal("signup", funnel_goal("signup")).unwrap_err();
        assert!(matches!(err, GoalError::MissingActionType(ref id) if id == "noSuchAction"));
    }

    #[test]
    fn remove_goal_retracts_rules() {
        let f = fixture();
        f.goals.set_goal("signup", funnel_goal("signup")).unwrap();
        assert!(f.goals.remove_goal("signup").unwrap());
        assert!(f.rules.get_all_rules().unwrap().is_empty());
        assert!(!f.goals.remove_goal("signup").unwrap());
    }

    #[test]
    fn predefined_goals_do_not_overwrite_stored_ones() {
        let f = fixture();
        let mut edited = funnel_goal("signup");
        edited.metadata.name = "Edited".to_string();
        f.goals.set_goal("signup", edited).unwrap();

        let module = StaticModule::new("marketing")
            .with_document(
                Namespace::Goals,
                "signup",
                serde_json::to_string(&funnel_goal("signup")).unwrap(),
            )
            .with_document(
                Namespace::Goals,
                "newsletter",
                serde_json::to_string(&funnel_goal("newsletter")).unwrap(),
            )
            .with_document(Namespace::Goals, "broken", "{ not json");

        let installed = f.goals.load_predefined_goals(&module).unwrap();
        assert_eq!(installed, vec!["newsletter".to_string()]);
        assert_eq!(f.goals.get_goal("signup").unwrap().unwrap().metadata.name, "Edited");
        let newsletter = f.goals.get_goal("newsletter").unwrap().unwrap();
        assert_eq!(newsletter.metadata.module_id.as_deref(), Some("marketing"));
    }

    #[test]
    fn predefined_goal_waits_for_missing_types() {
        let f = fixture();
        let checkout = Goal::new(Metadata::new("checkout", "Checkout", ""))
            .with_start_event(Condition::new("cartCondition"))
            .with_target_event(Condition::new("formEventCondition"));
        let analytics = StaticModule::new("analytics").with_document(
            Namespace::Goals,
            "checkout",
            serde_json::to_string(&checkout).unwrap(),
        );

        assert!(f.goals.load_predefined_goals(&analytics).unwrap().is_empty());
        assert_eq!(f.goals.pending_goal_ids(), vec!["checkout".to_string()]);
        assert!(f.goals.get_goal("checkout").unwrap().is_none());

        f.registry.register_condition_type(ConditionType::new("cartCondition"));
        let shop = StaticModule::new("shop");
        let installed = f.goals.load_predefined_goals(&shop).unwrap();
        assert_eq!(installed, vec!["checkout".to_string()]);
        assert!(f.goals.pending_goal_ids().is_empty());

        let stored = f.goals.get_goal("checkout").unwrap().unwrap();
        assert_eq!(stored.metadata.module_id.as_deref(), Some("analytics"));
        assert_eq!(f.rules.get_all_rules().unwrap().len(), 2);
    }

    #[test]
    fn forgetting_a_module_drops_its_pending_goals() {
        let f = fixture();
        let checkout = Goal::new(Metadata::new("checkout", "Checkout", ""))
            .with_start_event(Condition::new("cartCondition"))
            .with_target_event(Condition::new("formEventCondition"));
        let analytics = StaticModule::new("analytics").with_document(
            Namespace::Goals,
            "checkout",
            serde_json::to_string(&checkout).unwrap(),
        );
        f.goals.load_predefined_goals(&analytics).unwrap();

        f.goals.forget_predefined_goals(&ModuleId::new("analytics"));
        f.registry.register_condition_type(ConditionType::new("cartCondition"));
        assert!(f.goals.load_predefined_goals(&StaticModule::new("shop")).unwrap().is_empty());
        assert!(f.goals.get_goal("checkout").unwrap().is_none());
    }

    #[test]
    fn disable_goals_using_leaves_other_goals_alone() {
        let f = fixture();
        f.goals.set_goal("signup", funnel_goal("signup")).unwrap();
        let other = Goal::new(Metadata::new("visit", "Visit", ""))
            .with_start_event(Condition::new("pageViewCondition"))
            .with_target_event(Condition::new("pageViewCondition"));
        f.goals.set_goal("visit", other.clone()).unwrap();

        let disabled = f
            .goals
            .disable_goals_using(&BTreeSet::from(["formEventCondition".to_string()]))
            .unwrap();
        assert_eq!(disabled, vec!["signup".to_string()]);

        assert!(!f.goals.get_goal("signup").unwrap().unwrap().metadata.enabled);
        assert!(f.rules.get_rule("signup.startEvent").unwrap().is_none());
        assert_eq!(f.goals.get_goal("visit").unwrap().unwrap(), other);
        assert!(f.rules.get_rule("visit.startEvent").unwrap().is_some());

        // Already disabled goals are not reported twice.
        let again = f
            .goals
            .disable_goals_using(&BTreeSet::from(["formEventCondition".to_string()]))
            .unwrap();
        assert!(again.is_empty());
    }

    fn seed_sessions(store: &MemoryStore) {
        let sessions = [
            session("s1", 1, &[("signup.start.reached", "x"), ("channel", "ads")]),
            session("s2", 1, &[("signup.start.reached", "x"), ("signup.target.reached", "y"), ("channel", "ads")]),
            session("s3", 2, &[("signup.start.reached", "x"), ("signup.target.reached", "y"), ("channel", "mail")]),
            session("s4", 2, &[("channel", "mail")]),
        ];
        for session in &sessions {
            store.save(session).unwrap();
        }
    }

    #[test]
    fn flat_report_counts_both_populations() {
        let f = fixture();
        seed_sessions(&f.store);
        let report = f.goals.get_goal_report("signup", None, None).unwrap();
        assert_eq!(report.global_stats.start_count, 3);
        assert_eq!(report.global_stats.target_count, 2);
        assert!(report.split.is_empty());
    }

    #[test]
    fn date_split_buckets_by_session_day() {
        let f = fixture();
        seed_sessions(&f.store);
        let report = f
            .goals
            .get_goal_report("signup", Some("sessionCreationDate"), None)
            .unwrap();
        let keys: Vec<&str> = report.split.keys().collect();
        assert_eq!(keys, vec!["2024-03-01", "2024-03-02"]);
        let first = &report.split["2024-03-01"];
        assert_eq!((first.start_count, first.target_count), (2, 1));
        assert!((first.conversion_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn terms_split_with_filter() {
        let f = fixture();
        seed_sessions(&f.store);
        let filter = Condition::new("sessionPropertyCondition")
            .with_parameter("propertyName", "properties.channel")
            .with_parameter("comparisonOperator", "equals")
            .with_parameter("propertyValue", "ads");
        let report = f
            .goals
            .get_goal_report("signup", Some("properties.channel"), Some(&filter))
            .unwrap();
        assert_eq!(report.global_stats.start_count, 2);
        assert_eq!(report.global_stats.target_count, 1);
        assert_eq!(report.split.len(), 1);
        assert_eq!(report.split["ads"].target_count, 1);
    }

    #[test]
    fn store_errors_propagate_from_reports() {
        let f = fixture();
        seed_sessions(&f.store);
        let filter = Condition::new("scriptCondition");
        let err = f.goals.get_goal_report("signup", None, Some(&filter)).unwrap_err();
        assert!(matches!(err, GoalError::Store(StoreError::UnsupportedCondition(_))));
    }

    #[test]
    fn goals_and_rules_survive_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry = fixture().registry;
        {
            let store = Arc::new(MemoryStore::open(dir.path()).unwrap());
            let rules = Arc::new(StoreRuleService::new(store.clone()));
            let goals = GoalsService::new(registry.clone(), store, rules);
            goals.set_goal("signup", funnel_goal("signup")).unwrap();
        }

        let store = Arc::new(MemoryStore::open(dir.path()).unwrap());
        let rules = Arc::new(StoreRuleService::new(store.clone()));
        let goals = GoalsService::new(registry, store, rules.clone());
        assert_eq!(goals.get_goal("signup").unwrap().unwrap(), funnel_goal("signup"));
        assert_eq!(rules.get_all_rules().unwrap().len(), 2);
    }
}
