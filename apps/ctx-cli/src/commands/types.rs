// types.rs — List registered condition, action, value and property types.

use std::collections::BTreeSet;

use clap::ValueEnum;
use ctx_definitions::RegistrySnapshot;
use ctx_server::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeKind {
    Condition,
    Action,
    Value,
    Property,
}

impl TypeKind {
    fn label(&self) -> &'static str {
        match self {
            TypeKind::Condition => "condition",
            TypeKind::Action => "action",
            TypeKind::Value => "value",
            TypeKind::Property => "property",
        }
    }
}

/// One printed line.
#[derive(Debug, PartialEq)]
struct TypeRow {
    id: String,
    tags: String,
    detail: String,
}

pub fn execute(config: &ServerConfig, kind: TypeKind, tag: Option<&str>, recursive: bool) -> anyhow::Result<()> {
    if kind == TypeKind::Property && tag.is_some() {
        anyhow::bail!("property types are listed by group, --tag is not supported");
    }
    let server = super::open_server(config)?;
    let rows = type_rows(&server.registry().snapshot(), kind, tag, recursive);

    if rows.is_empty() {
        println!("No {} types found.", kind.label());
        return Ok(());
    }
    let detail_header = match kind {
        TypeKind::Condition => "CATEGORY",
        TypeKind::Property => "GROUP / VALUE TYPE",
        TypeKind::Action | TypeKind::Value => "",
    };
    println!("{:<36} {:<36} {}", "ID", "TAGS", detail_header);
    println!("{}", "-".repeat(94));
    for row in &rows {
        println!(
            "{:<36} {:<36} {}",
            super::truncate(&row.id, 34),
            super::truncate(&row.tags, 34),
            row.detail
        );
    }
    println!("\n{} type(s) total.", rows.len());
    Ok(())
}

fn join(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn type_rows(snapshot: &RegistrySnapshot, kind: TypeKind, tag: Option<&str>, recursive: bool) -> Vec<TypeRow> {
    match kind {
        TypeKind::Condition => {
            let types = match tag {
                Some(tag) => snapshot.get_condition_types_by_tag(tag, recursive),
                None => snapshot.get_all_condition_types(),
            };
            types
                .iter()
                .map(|t| TypeRow {
                    id: t.id.clone(),
                    tags: join(&t.tag_ids),
                    detail: t.category.to_string(),
                })
                .collect()
        }
        TypeKind::Action => {
            let types = match tag {
                Some(tag) => snapshot.get_action_types_by_tag(tag, recursive),
                None => snapshot.get_all_action_types(),
            };
            types
                .iter()
                .map(|t| TypeRow {
                    id: t.id.clone(),
                    tags: join(&t.tag_ids),
                    detail: String::new(),
                })
                .collect()
        }
        TypeKind::Value => {
            let types = match tag {
                Some(tag) => snapshot.get_value_types_by_tag(tag, recursive),
                None => snapshot.get_all_value_types(),
            };
            types
                .iter()
                .map(|t| TypeRow {
                    id: t.id.clone(),
                    tags: join(&t.tag_ids),
                    detail: String::new(),
                })
                .collect()
        }
        TypeKind::Property => snapshot
            .get_property_type_groups()
            .iter()
            .flat_map(|group| snapshot.get_property_types(&group.id).unwrap_or_default())
            .map(|t| TypeRow {
                id: t.id.clone(),
                tags: join(&t.tag_ids),
                detail: format!("{} / {}", t.group_id, t.value_type_id),
            })
            .collect(),
    }
}
