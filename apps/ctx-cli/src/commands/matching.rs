// matching.rs — Evaluate a condition document for a profile and session.

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use ctx_store::{Item, ItemType, PersistenceService, Profile, Session};
use ctx_server::ServerConfig;

pub fn execute(
    config: &ServerConfig,
    condition_path: &Path,
    profile_id: Option<&str>,
    session_id: Option<&str>,
) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(condition_path)
        .with_context(|| format!("failed to read {}", condition_path.display()))?;
    let server = super::open_server(config)?;

    let profile = match profile_id {
        Some(id) => load::<Profile>(server.store().as_ref(), id)?,
        None => Profile::new("anonymous"),
    };
    let session = match session_id {
        Some(id) => load::<Session>(server.store().as_ref(), id)?,
        None => Session::new("cli-session", profile.item_id.clone(), Utc::now()),
    };

    let matched = server
        .evaluator()
        .match_condition_json(&json, &profile, &session)?;
    println!("{}", matched);
    Ok(())
}

fn load<T: ItemType>(store: &dyn PersistenceService, id: &str) -> anyhow::Result<T> {
    let item: Item = store
        .load(T::ITEM_TYPE, id)?
        .with_context(|| format!("{} not found: {}", T::ITEM_TYPE, id))?;
    Ok(item.to_entity()?)
}
