// tags.rs — Print the tag taxonomy.

use ctx_definitions::RegistrySnapshot;
use ctx_server::ServerConfig;

pub fn execute(config: &ServerConfig) -> anyhow::Result<()> {
    let server = super::open_server(config)?;
    let snapshot = server.registry().snapshot();

    let lines = tag_tree(&snapshot);
    if lines.is_empty() {
        println!("No tags registered.");
        return Ok(());
    }
    for line in &lines {
        println!("{}", line);
    }
    println!("\n{} tag(s) total.", snapshot.get_all_tags().len());
    Ok(())
}

/// One line per tag, children indented under their parent, siblings in
/// rank order.
fn tag_tree(snapshot: &RegistrySnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    let mut stack: Vec<(&str, usize)> = snapshot
        .get_root_tags()
        .iter()
        .rev()
        .map(|tag| (tag.id.as_str(), 0))
        .collect();
    while let Some((id, depth)) = stack.pop() {
        lines.push(format!("{}{}", "  ".repeat(depth), id));
        for child in snapshot.get_sub_tags(id).iter().rev() {
            stack.push((child.id.as_str(), depth + 1));
        }
    }
    lines
}
