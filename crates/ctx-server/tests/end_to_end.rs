// end_to_end.rs — Full module lifecycle through the context server.
//
// This test drives one module from disk through every service:
//
//   1. Lay out a module directory (tags, condition/action types, mappings, a goal)
//   2. Discover and activate it → definitions indexed, goal installed, rules compiled
//   3. Evaluate an event condition against recorded events
//   4. Record sessions stamped by the goal rules → funnel report, flat and split
//   5. Deactivate the module → goal disabled, rules retracted
//   6. Reopen the server on the same data directory → state persisted
//
// The goal rules are not fired here (that is the rule engine's job); sessions
// are recorded with the properties those rules would have stamped.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use ctx_definitions::{Condition, ModuleId, ModuleSource};
use ctx_goals::RuleService;
use ctx_server::{ContextServer, DirectoryModule, LifecycleActor, ServerConfig};
use ctx_store::{Event, Item, PersistenceService, Profile, Session};

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn lay_out_web_module(modules_dir: &Path) {
    let web = modules_dir.join("web");
    write(&web, "tags/eventCondition.json", r#"{"id": "eventCondition", "rank": 1}"#);
    write(&web, "tags/sessionCondition.json", r#"{"id": "sessionCondition", "rank": 2}"#);
    write(&web, "tags/logicalCondition.json", r#"{"id": "logicalCondition", "rank": 3}"#);
    write(
        &web,
        "tags/formEvents.json",
        r#"{"id": "formEvents", "parent": "eventCondition"}"#,
    );
    write(
        &web,
        "conditions/sessionEventCondition.json",
        r#"{"id": "sessionEventCondition", "tags": ["eventCondition"]}"#,
    );
    write(
        &web,
        "conditions/eventTypeCondition.json",
        r#"{"id": "eventTypeCondition", "tags": ["eventCondition"]}"#,
    );
    write(
        &web,
        "conditions/forms/formEventCondition.json",
        r#"{"id": "formEventCondition", "tags": ["formEvents"]}"#,
    );
    write(
        &web,
        "conditions/sessionPropertyCondition.json",
        r#"{"id": "sessionPropertyCondition", "tags": ["sessionCondition"]}"#,
    );
    write(
        &web,
        "conditions/andCondition.json",
        r#"{"id": "andCondition", "tags": ["logicalCondition"], "operator": "and"}"#,
    );
    write(&web, "conditions/goalMatchCondition.json", r#"{"id": "goalMatchCondition"}"#);
    write(&web, "actions/setPropertyAction.json", r#"{"id": "setPropertyAction"}"#);
    write(&web, "mappings/session.json", r#"{"properties": {"timeStamp": {"type": "date"}}}"#);
    write(
        &web,
        "goals/signup.json",
        r#"{
            "metadata": {"id": "signup", "name": "Sign up", "description": "Visitors who register"},
            "startEvent": {"type": "eventTypeCondition", "parameterValues": {"eventTypeId": "view"}},
            "targetEvent": {"type": "formEventCondition", "parameterValues": {"formId": "register"}}
        }"#,
    );
}

fn stamped_session(id: &str, day: u32, start: bool, target: bool, channel: &str) -> Session {
    let mut session = Session::new(id, "p1", Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap())
        .with_property("channel", channel);
    if start {
        session = session.with_property("signup.start.reached", "2024-05-01T09:00:00Z");
    }
    if target {
        session = session.with_property("signup.target.reached", "2024-05-01T09:05:00Z");
    }
    session
}

#[test]
fn module_to_report_to_deactivation() {
    // =========================================================
    // SETUP: a project with one module on disk
    // =========================================================
    let project = tempdir().unwrap();
    let config = ServerConfig::for_project(project.path());
    lay_out_web_module(&config.modules_dir);

    let server = ContextServer::new(config.clone()).unwrap();

    // =========================================================
    // ACTIVATE: definitions, mappings, predefined goal
    // =========================================================
    let modules = DirectoryModule::discover(&config.modules_dir).unwrap();
    assert_eq!(modules.len(), 1);
    let report = server.activate(&modules[0]).unwrap();
    assert!(report.load.failures.is_empty());
    assert_eq!(report.goals_installed, vec!["signup".to_string()]);
    assert!(server.store().mapping("session").is_some());

    let snapshot = server.registry().snapshot();
    let roots: Vec<&str> = snapshot.get_root_tags().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(roots, vec!["eventCondition", "sessionCondition", "logicalCondition"]);
    let event_types: Vec<String> = snapshot
        .get_condition_types_by_tag("eventCondition", true)
        .iter()
        .map(|t| t.id.clone())
        .collect();
    assert_eq!(event_types, vec!["eventTypeCondition", "formEventCondition", "sessionEventCondition"]);
    assert!(snapshot.get_condition_types_by_tag("eventCondition", false).len() < event_types.len());

    let rules = ctx_goals::StoreRuleService::new(server.store().clone());
    assert_eq!(rules.get_all_rules().unwrap().len(), 2);

    // =========================================================
    // EVALUATE: an event count condition against recorded events
    // =========================================================
    let profile = Profile::new("p1");
    let session = stamped_session("s1", 1, true, false, "ads");
    for minute in [1, 2] {
        let event = Event::new("view", &session, Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap());
        server.store().save(&Item::from_entity(&event).unwrap()).unwrap();
    }
    let viewed_twice = Condition::from_json(
        r#"{"type": "sessionEventCondition", "parameterValues": {
                "eventCondition": {"type": "eventTypeCondition", "parameterValues": {"eventTypeId": "view"}},
                "minimumEventCount": 2}}"#,
    )
    .unwrap();
    assert!(server.match_condition(&viewed_twice, &profile, &session).unwrap());
    let viewed_thrice = Condition::from_json(
        r#"{"type": "sessionEventCondition", "parameterValues": {
                "eventCondition": {"type": "eventTypeCondition", "parameterValues": {"eventTypeId": "view"}},
                "minimumEventCount": "3"}}"#,
    )
    .unwrap();
    assert!(!server.match_condition(&viewed_thrice, &profile, &session).unwrap());

    // =========================================================
    // REPORT: sessions stamped by the goal rules
    // =========================================================
    server.record_session(&session).unwrap();
    server.record_session(&stamped_session("s2", 1, true, true, "ads")).unwrap();
    server.record_session(&stamped_session("s3", 2, true, true, "mail")).unwrap();
    server.record_session(&stamped_session("s4", 2, true, false, "mail")).unwrap();
    server.record_session(&stamped_session("s5", 2, false, false, "mail")).unwrap();

    let flat = server.goal_report("signup", None, None).unwrap();
    assert_eq!(flat.global_stats.start_count, 4);
    assert_eq!(flat.global_stats.target_count, 2);
    assert!((flat.global_stats.conversion_rate - 0.5).abs() < 1e-9);

    let by_day = server.goal_report("signup", Some("sessionCreationDate"), None).unwrap();
    assert_eq!(by_day.split.len(), 2);
    assert_eq!(by_day.split["2024-05-01"].start_count, 2);
    assert!((by_day.split["2024-05-02"].percentage - 0.5).abs() < 1e-9);

    let mail_only = Condition::new("sessionPropertyCondition")
        .with_parameter("propertyName", "properties.channel")
        .with_parameter("comparisonOperator", "equals")
        .with_parameter("propertyValue", "mail");
    let filtered = server
        .goal_report("signup", Some("properties.channel"), Some(&mail_only))
        .unwrap();
    assert_eq!(filtered.split.keys().collect::<Vec<_>>(), vec!["mail"]);
    assert_eq!(filtered.global_stats.start_count, 2);

    // =========================================================
    // DEACTIVATE: goal disabled, rules retracted
    // =========================================================
    let deactivated = server.deactivate(&modules[0].module_id()).unwrap();
    assert_eq!(deactivated.goals_disabled, vec!["signup".to_string()]);
    assert!(deactivated.removed.condition_types.contains("formEventCondition"));
    assert!(server.registry().snapshot().get_all_condition_types().is_empty());
    assert!(rules.get_all_rules().unwrap().is_empty());

    // =========================================================
    // REOPEN: everything written so far is on disk
    // =========================================================
    drop(server);
    let reopened = ContextServer::new(config).unwrap();
    let goal = reopened.goal("signup").unwrap();
    assert!(!goal.metadata.enabled);
    assert_eq!(goal.metadata.module_id.as_deref(), Some("web"));
    assert_eq!(reopened.store().count("session"), 5);
    assert!(reopened.store().mapping("session").is_some());
}

#[tokio::test]
async fn directory_modules_through_the_lifecycle_actor() {
    let project = tempdir().unwrap();
    let config = ServerConfig::for_project(project.path());
    lay_out_web_module(&config.modules_dir);

    let server = Arc::new(ContextServer::new(config.clone()).unwrap());
    let (handle, task) = LifecycleActor::spawn(server.clone());

    for module in DirectoryModule::discover(&config.modules_dir).unwrap() {
        handle.activate(module).await.unwrap();
    }
    assert!(server.goal("signup").unwrap().metadata.enabled);

    // The module loses its form condition and is reloaded.
    fs::remove_file(config.modules_dir.join("web/conditions/forms/formEventCondition.json")).unwrap();
    let module = DirectoryModule::open(config.modules_dir.join("web")).unwrap();
    let reloaded = handle.activate(module).await.unwrap();
    assert_eq!(reloaded.goals_disabled, vec!["signup".to_string()]);
    assert!(server.registry().snapshot().get_condition_type("formEventCondition").is_none());

    let removed = handle.deactivate(ModuleId::new("web")).await.unwrap();
    assert!(removed.removed.condition_types.contains("eventTypeCondition"));

    drop(handle);
    task.await.unwrap();
}
