// server.rs — ContextServer: the services of one context server, wired.
//
// ContextServer owns the definitions registry, the store, the condition
// evaluator and the goal engine, all sharing the same registry and store.
// Module activation and deactivation go through `activate` / `deactivate`,
// which apply a module to the registry first and to the goal engine second.
// Callers that receive lifecycle events concurrently should route them
// through the `LifecycleActor` so they apply one at a time.

use std::sync::Arc;

use ctx_conditions::ConditionEvaluator;
use ctx_definitions::{
    Condition, DefinitionsRegistry, LoadReport, MappingSink, ModuleContributions, ModuleId, ModuleSource,
};
use ctx_goals::{Goal, GoalError, GoalReport, GoalsService, StoreRuleService};
use ctx_store::{Item, MemoryStore, PersistenceService, Profile, Session, StoreMappings};

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Outcome of activating one module.
#[derive(Debug)]
pub struct ActivationReport {
    pub load: LoadReport,
    /// Predefined goals installed from the module.
    pub goals_installed: Vec<String>,
    /// Goals disabled because a reload dropped condition types they use.
    pub goals_disabled: Vec<String>,
}

/// Outcome of deactivating one module.
#[derive(Debug)]
pub struct DeactivationReport {
    pub module_id: ModuleId,
    pub removed: ModuleContributions,
    pub goals_disabled: Vec<String>,
}

/// The context server services.
pub struct ContextServer {
    config: ServerConfig,
    registry: Arc<DefinitionsRegistry>,
    store: Arc<MemoryStore>,
    evaluator: ConditionEvaluator,
    goals: GoalsService,
}

impl ContextServer {
    /// Open the store under `config.data_dir` and wire the services.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let registry = Arc::new(DefinitionsRegistry::new());
        let store = Arc::new(MemoryStore::open(&config.data_dir)?.with_registry(registry.clone()));
        let rules = Arc::new(StoreRuleService::new(store.clone()));
        let evaluator = ConditionEvaluator::new(registry.clone(), store.clone());
        let goals = GoalsService::new(registry.clone(), store.clone(), rules).with_settings(config.goals_settings());

        tracing::info!("context server data directory: {}", config.data_dir.display());
        Ok(Self {
            config,
            registry,
            store,
            evaluator,
            goals,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DefinitionsRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    pub fn goals(&self) -> &GoalsService {
        &self.goals
    }

    /// Load (or reload) a module's definitions, then its predefined goals.
    ///
    /// On reload, goals using condition types the module no longer provides
    /// are disabled before new goals are installed. Predefined goals of
    /// earlier modules that were waiting for this module's types are
    /// installed too.
    pub fn activate(&self, module: &dyn ModuleSource) -> Result<ActivationReport, ServerError> {
        let mappings = StoreMappings(self.store.as_ref());
        let load = self
            .registry
            .load_module(module, Some(&mappings as &dyn MappingSink));
        tracing::info!(
            "activated module '{}' ({} condition types, {} failures)",
            load.module_id,
            self.registry.types_by_module(&load.module_id).condition_types.len(),
            load.failures.len()
        );

        let goals_disabled = self.goals.disable_goals_using(&load.removed.condition_types)?;
        let goals_installed = self.goals.load_predefined_goals(module)?;
        Ok(ActivationReport {
            load,
            goals_installed,
            goals_disabled,
        })
    }

    /// Retract a module's definitions, then disable the goals that relied
    /// on its condition types. Deactivating an unknown module is a no-op.
    pub fn deactivate(&self, module_id: &ModuleId) -> Result<DeactivationReport, ServerError> {
        let removed = self.registry.unload_module(module_id);
        self.goals.forget_predefined_goals(module_id);
        let goals_disabled = self.goals.disable_goals_using(&removed.condition_types)?;
        tracing::info!(
            "deactivated module '{}' ({} goals disabled)",
            module_id,
            goals_disabled.len()
        );
        Ok(DeactivationReport {
            module_id: module_id.clone(),
            removed,
            goals_disabled,
        })
    }

    /// Whether `profile` in `session` satisfies `condition`.
    pub fn match_condition(
        &self,
        condition: &Condition,
        profile: &Profile,
        session: &Session,
    ) -> Result<bool, ServerError> {
        Ok(self.evaluator.match_condition(condition, profile, session)?)
    }

    /// Load a goal, failing if it does not exist.
    pub fn goal(&self, goal_id: &str) -> Result<Goal, ServerError> {
        self.goals
            .get_goal(goal_id)?
            .ok_or_else(|| GoalError::NotFound(goal_id.to_string()).into())
    }

    /// Funnel report of an existing goal.
    pub fn goal_report(
        &self,
        goal_id: &str,
        split: Option<&str>,
        filter: Option<&Condition>,
    ) -> Result<GoalReport, ServerError> {
        self.goal(goal_id)?;
        Ok(self.goals.get_goal_report(goal_id, split, filter)?)
    }

    /// Record a session so it shows up in reports.
    pub fn record_session(&self, session: &Session) -> Result<(), ServerError> {
        self.store.save(&Item::from_entity(session)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctx_definitions::{DefinitionDocument, Namespace, StaticModule};
    use ctx_goals::Metadata;

    fn server() -> (tempfile::TempDir, ContextServer) {
        let dir = tempfile::tempdir().unwrap();
        let server = ContextServer::new(ServerConfig::for_project(dir.path())).unwrap();
        (dir, server)
    }

    fn module(with_forms: bool) -> StaticModule {
        let mut module = StaticModule::new("web")
            .with_document(Namespace::Tags, "event", r#"{"id": "eventCondition"}"#)
            .with_document(
                Namespace::Conditions,
                "pageView",
                r#"{"id": "pageViewCondition", "tags": ["eventCondition"]}"#,
            )
            .with_document(Namespace::Actions, "setProperty", r#"{"id": "setPropertyAction"}"#)
            .with_document(Namespace::Mappings, "session", r#"{"properties": {}}"#);
        if with_forms {
            module.add_document(
                Namespace::Conditions,
                DefinitionDocument::new("formEvent", r#"{"id": "formEventCondition", "tags": ["eventCondition"]}"#),
            );
        }
        module
    }

    fn signup_goal() -> Goal {
        Goal::new(Metadata::new("signup", "Sign up", ""))
            .with_start_event(Condition::new("pageViewCondition"))
            .with_target_event(Condition::new("formEventCondition"))
    }

    #[test]
    fn activate_loads_definitions_and_mappings() {
        let (_dir, server) = server();
        let report = server.activate(&module(true)).unwrap();
        assert_eq!(report.load.loaded_count(Namespace::Conditions), 2);
        assert!(server.store().mapping("session").is_some());
        let contributed = server.registry().types_by_module(&ModuleId::new("web"));
        assert_eq!(contributed.condition_types.len(), 2);
    }

    #[test]
    fn reload_without_a_type_disables_goals_using_it() {
        let (_dir, server) = server();
        server.activate(&module(true)).unwrap();
        server.goals().set_goal("signup", signup_goal()).unwrap();

        let report = server.activate(&module(false)).unwrap();
        assert!(report.load.removed.condition_types.contains("formEventCondition"));
        assert_eq!(report.goals_disabled, vec!["signup".to_string()]);
        assert!(!server.goal("signup").unwrap().metadata.enabled);
    }

    #[test]
    fn deactivate_disables_dependent_goals() {
        let (_dir, server) = server();
        server.activate(&module(true)).unwrap();
        server.goals().set_goal("signup", signup_goal()).unwrap();

        let report = server.deactivate(&ModuleId::new("web")).unwrap();
        assert_eq!(report.goals_disabled, vec!["signup".to_string()]);
        assert!(server.registry().snapshot().get_condition_type("pageViewCondition").is_none());

        let again = server.deactivate(&ModuleId::new("web")).unwrap();
        assert!(again.removed.is_empty());
    }

    #[test]
    fn goal_module_may_precede_the_module_providing_its_types() {
        let (_dir, server) = server();
        let visit = Goal::new(Metadata::new("visit", "Visit", ""))
            .with_start_event(Condition::new("pageViewCondition"))
            .with_target_event(Condition::new("pageViewCondition"));
        let analytics = StaticModule::new("analytics").with_document(
            Namespace::Goals,
            "visit",
            serde_json::to_string(&visit).unwrap(),
        );

        let first = server.activate(&analytics).unwrap();
        assert!(first.goals_installed.is_empty());
        assert!(server.goals().get_goal("visit").unwrap().is_none());

        let second = server.activate(&module(false)).unwrap();
        assert_eq!(second.goals_installed, vec!["visit".to_string()]);
        let stored = server.goal("visit").unwrap();
        assert!(stored.metadata.enabled);
        assert_eq!(stored.metadata.module_id.as_deref(), Some("analytics"));
    }

    #[test]
    fn unreadable_document_does_not_retract_its_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::for_project(dir.path());
        let web = config.modules_dir.join("web");
        let conditions = web.join("conditions");
        std::fs::create_dir_all(&conditions).unwrap();
        std::fs::create_dir_all(web.join("actions")).unwrap();
        std::fs::write(
            conditions.join("a.json"),
            r#"{"id": "pageViewCondition", "tags": ["eventCondition"]}"#,
        )
        .unwrap();
        std::fs::write(
            conditions.join("b.json"),
            r#"{"id": "formEventCondition", "tags": ["eventCondition"]}"#,
        )
        .unwrap();
        std::fs::write(web.join("actions/set.json"), r#"{"id": "setPropertyAction"}"#).unwrap();

        let server = ContextServer::new(config).unwrap();
        let module = crate::DirectoryModule::open(&web).unwrap();
        server.activate(&module).unwrap();
        server.goals().set_goal("signup", signup_goal()).unwrap();

        std::fs::write(conditions.join("c.json"), [0xff, 0xfe, b'{', b'}']).unwrap();
        let report = server.activate(&module).unwrap();
        assert!(report.load.removed.condition_types.is_empty());
        assert!(report.goals_disabled.is_empty());

        let snapshot = server.registry().snapshot();
        assert!(snapshot.get_condition_type("pageViewCondition").is_some());
        assert!(snapshot.get_condition_type("formEventCondition").is_some());
        assert!(server.goal("signup").unwrap().metadata.enabled);
    }

    #[test]
    fn report_of_unknown_goal_is_not_found() {
        let (_dir, server) = server();
        let err = server.goal_report("nope", None, None).unwrap_err();
        assert!(matches!(err, ServerError::Goal(GoalError::NotFound(ref id)) if id == "nope"));
    }
}
