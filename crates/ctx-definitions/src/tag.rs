// tag.rs — Tags and the tag taxonomy.
//
// Tags classify plugin definitions and form a forest through `parent_id`
// links. The taxonomy is an arena keyed by tag id: children are stored as id
// sets computed in a second pass (`rebuild`), so the parent/child graph never
// materializes as nested owned objects. Cycles in parent links are detected
// during the rebuild and broken by detaching one tag per cycle.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::module::ModuleId;

/// A taxonomy node.
///
/// Equality and hashing use the id alone; ordering is `(rank, id)`
/// ascending. Within one taxonomy ids are unique, so the two agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_key: Option<String>,

    #[serde(
        default,
        rename = "parent",
        alias = "parentId",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub rank: f64,

    #[serde(default)]
    pub hidden: bool,

    /// Module that contributed this tag. Set by the loader.
    #[serde(skip)]
    pub module_id: Option<ModuleId>,
}

impl Tag {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name_key: None,
            description_key: None,
            parent_id: None,
            rank: 0.0,
            hidden: false,
            module_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_rank(mut self, rank: f64) -> Self {
        self.rank = rank;
        self
    }

    /// Localization key for the tag name (`tag.<id>.name` unless overridden).
    pub fn name_key(&self) -> String {
        self.name_key
            .clone()
            .unwrap_or_else(|| format!("tag.{}.name", self.id))
    }

    /// Localization key for the tag description.
    pub fn description_key(&self) -> String {
        self.description_key
            .clone()
            .unwrap_or_else(|| format!("tag.{}.description", self.id))
    }

    /// The parent id, treating an empty string as "no parent".
    pub fn parent(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|p| !p.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .total_cmp(&other.rank)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Problems found while rebuilding the taxonomy. None of them are fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomyReport {
    /// Tags whose parent is not registered. They are treated as roots.
    pub orphans: Vec<String>,
    /// Cycles found in parent links, each listed by member ids.
    pub cycles: Vec<Vec<String>>,
}

/// Arena of tags with resolved parent/child edges.
#[derive(Debug, Clone, Default)]
pub struct TagTaxonomy {
    tags: BTreeMap<String, Tag>,
    children: BTreeMap<String, BTreeSet<String>>,
    roots: BTreeSet<String>,
    /// Tags whose parent edge was dropped to break a cycle.
    detached: BTreeSet<String>,
}

impl TagTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a taxonomy from a set of tags and resolve its edges.
    pub fn from_tags(tags: impl IntoIterator<Item = Tag>) -> (Self, TaxonomyReport) {
        let mut taxonomy = Self::new();
        for tag in tags {
            taxonomy.insert(tag);
        }
        let report = taxonomy.rebuild();
        (taxonomy, report)
    }

    /// Insert or replace a tag. Edges are stale until [`rebuild`](Self::rebuild).
    pub fn insert(&mut self, tag: Tag) {
        self.tags.insert(tag.id.clone(), tag);
    }

    /// Drop every tag for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&Tag) -> bool) {
        self.tags.retain(|_, tag| keep(tag));
    }

    /// Second pass: recompute roots and child sets from parent ids.
    pub fn rebuild(&mut self) -> TaxonomyReport {
        let mut report = TaxonomyReport::default();
        self.children.clear();
        self.roots.clear();
        self.detached = self.break_cycles(&mut report.cycles);

        for tag in self.tags.values() {
            if self.detached.contains(&tag.id) {
                self.roots.insert(tag.id.clone());
                continue;
            }
            match tag.parent() {
                None => {
                    self.roots.insert(tag.id.clone());
                }
                Some(parent) if self.tags.contains_key(parent) => {
                    self.children
                        .entry(parent.to_string())
                        .or_default()
                        .insert(tag.id.clone());
                }
                Some(_) => {
                    report.orphans.push(tag.id.clone());
                    self.roots.insert(tag.id.clone());
                }
            }
        }
        report
    }

    /// Walk parent chains from every tag; whenever a chain revisits a tag,
    /// detach the smallest id of that cycle and walk again.
    fn break_cycles(&self, cycles: &mut Vec<Vec<String>>) -> BTreeSet<String> {
        let mut detached = BTreeSet::new();
        for start in self.tags.keys() {
            loop {
                let mut path: Vec<&str> = Vec::new();
                let mut current = Some(start.as_str());
                let mut cycle = None;
                while let Some(id) = current {
                    if let Some(pos) = path.iter().position(|p| *p == id) {
                        cycle = Some(path[pos..].iter().map(|s| s.to_string()).collect::<Vec<_>>());
                        break;
                    }
                    path.push(id);
                    current = if detached.contains(id) {
                        None
                    } else {
                        self.tags
                            .get(id)
                            .and_then(Tag::parent)
                            .filter(|p| self.tags.contains_key(*p))
                    };
                }
                match cycle {
                    Some(members) => {
                        if let Some(victim) = members.iter().min() {
                            detached.insert(victim.clone());
                        }
                        cycles.push(members);
                    }
                    None => break,
                }
            }
        }
        detached
    }

    pub fn get(&self, id: &str) -> Option<&Tag> {
        self.tags.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tags.contains_key(id)
    }

    /// All tags, ordered by `(rank, id)`.
    pub fn all(&self) -> Vec<&Tag> {
        self.sorted(self.tags.keys())
    }

    /// Root tags, ordered by `(rank, id)`.
    pub fn roots(&self) -> Vec<&Tag> {
        self.sorted(self.roots.iter())
    }

    /// Direct children of a tag, ordered by `(rank, id)`. Unknown tag → empty.
    pub fn sub_tags(&self, id: &str) -> Vec<&Tag> {
        match self.children.get(id) {
            Some(children) => self.sorted(children.iter()),
            None => Vec::new(),
        }
    }

    /// The tag and all of its transitive sub-tags. Unknown tag → empty.
    pub fn descendants_and_self(&self, id: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        if !self.tags.contains_key(id) {
            return visited;
        }
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(children) = self.children.get(&current) {
                stack.extend(children.iter().filter(|c| !visited.contains(*c)).cloned());
            }
        }
        visited
    }

    /// The child→parent edges currently in effect.
    pub fn edges(&self) -> BTreeSet<(String, String)> {
        self.children
            .iter()
            .flat_map(|(parent, children)| {
                children.iter().map(move |c| (c.clone(), parent.clone()))
            })
            .collect()
    }

    fn sorted<'a>(&'a self, ids: impl Iterator<Item = &'a String>) -> Vec<&'a Tag> {
        let mut tags: Vec<&Tag> = ids.filter_map(|id| self.tags.get(id)).collect();
        tags.sort();
        tags
    }
}
