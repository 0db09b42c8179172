// registry.rs — The definitions registry.
//
// The registry owns the tag taxonomy and the catalogs of condition, action,
// value and property types, plus the per-tag indexes over them. All of it
// lives in an immutable `RegistrySnapshot` behind an `Arc`:
//
// - readers call `snapshot()` and keep a consistent view for as long as
//   they hold the Arc, no matter what reloads happen meanwhile;
// - writers are serialized, copy the current snapshot, apply their change,
//   rebuild every index from scratch and swap the new snapshot in.
//
// A reader can therefore never observe a half-rebuilt index, and because
// indexes are id sets, a type can never appear twice under the same tag.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::de::DeserializeOwned;

use crate::error::DefinitionError;
use crate::module::{DefinitionDocument, MappingSink, ModuleId, ModuleSource, Namespace};
use crate::tag::{Tag, TagTaxonomy, TaxonomyReport};
use crate::types::{ActionType, ConditionType, PluginType, PropertyType, PropertyTypeGroup, ValueType};

/// Property documents whose name ends with this suffix describe groups.
const PROPERTY_GROUP_SUFFIX: &str = "PropertyGroup";

/// Kinds of registered definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DefinitionKind {
    Tag,
    ConditionType,
    ActionType,
    ValueType,
    PropertyType,
    PropertyTypeGroup,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionKind::Tag => write!(f, "tag"),
            DefinitionKind::ConditionType => write!(f, "condition type"),
            DefinitionKind::ActionType => write!(f, "action type"),
            DefinitionKind::ValueType => write!(f, "value type"),
            DefinitionKind::PropertyType => write!(f, "property type"),
            DefinitionKind::PropertyTypeGroup => write!(f, "property type group"),
        }
    }
}

/// A reference from a definition to a tag or value type that is not
/// registered. Logged and dropped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub kind: DefinitionKind,
    pub owner: String,
    pub reference: String,
}

/// Result of an index rebuild.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub taxonomy: TaxonomyReport,
    pub unresolved: Vec<UnresolvedReference>,
}

/// Ids of every definition one module contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleContributions {
    pub tags: BTreeSet<String>,
    pub condition_types: BTreeSet<String>,
    pub action_types: BTreeSet<String>,
    pub value_types: BTreeSet<String>,
    pub property_types: BTreeSet<String>,
    pub property_groups: BTreeSet<String>,
}

impl ModuleContributions {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.condition_types.is_empty()
            && self.action_types.is_empty()
            && self.value_types.is_empty()
            && self.property_types.is_empty()
            && self.property_groups.is_empty()
    }

    pub fn contains(&self, kind: DefinitionKind, id: &str) -> bool {
        self.ids(kind).contains(id)
    }

    /// Entries present in `self` but not in `other`.
    pub fn difference(&self, other: &ModuleContributions) -> ModuleContributions {
        let diff = |a: &BTreeSet<String>, b: &BTreeSet<String>| a.difference(b).cloned().collect();
        ModuleContributions {
            tags: diff(&self.tags, &other.tags),
            condition_types: diff(&self.condition_types, &other.condition_types),
            action_types: diff(&self.action_types, &other.action_types),
            value_types: diff(&self.value_types, &other.value_types),
            property_types: diff(&self.property_types, &other.property_types),
            property_groups: diff(&self.property_groups, &other.property_groups),
        }
    }

    fn ids(&self, kind: DefinitionKind) -> &BTreeSet<String> {
        match kind {
            DefinitionKind::Tag => &self.tags,
            DefinitionKind::ConditionType => &self.condition_types,
            DefinitionKind::ActionType => &self.action_types,
            DefinitionKind::ValueType => &self.value_types,
            DefinitionKind::PropertyType => &self.property_types,
            DefinitionKind::PropertyTypeGroup => &self.property_groups,
        }
    }
}

/// Outcome of loading one module.
#[derive(Debug)]
pub struct LoadReport {
    pub module_id: ModuleId,
    /// Documents successfully parsed, per namespace.
    pub loaded: BTreeMap<Namespace, usize>,
    /// Documents or namespaces that failed. They were skipped.
    pub failures: Vec<DefinitionError>,
    /// Definitions the module contributed before this load but no longer does.
    pub removed: ModuleContributions,
}

impl LoadReport {
    fn new(module_id: ModuleId) -> Self {
        Self {
            module_id,
            loaded: BTreeMap::new(),
            failures: Vec::new(),
            removed: ModuleContributions::default(),
        }
    }

    pub fn loaded_count(&self, namespace: Namespace) -> usize {
        self.loaded.get(&namespace).copied().unwrap_or(0)
    }
}

/// Parsed documents of one module, ready to be applied to a snapshot.
#[derive(Debug, Default)]
struct ParsedBatch {
    tags: Vec<Tag>,
    condition_types: Vec<ConditionType>,
    action_types: Vec<ActionType>,
    value_types: Vec<ValueType>,
    property_types: Vec<PropertyType>,
    property_groups: Vec<PropertyTypeGroup>,
}

/// An immutable, fully indexed view of the registry.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    taxonomy: TagTaxonomy,
    condition_types: BTreeMap<String, Arc<ConditionType>>,
    action_types: BTreeMap<String, Arc<ActionType>>,
    value_types: BTreeMap<String, Arc<ValueType>>,
    property_types: BTreeMap<String, Arc<PropertyType>>,
    declared_groups: BTreeMap<String, PropertyTypeGroup>,

    // Derived by `reindex`.
    condition_types_by_tag: BTreeMap<String, BTreeSet<String>>,
    action_types_by_tag: BTreeMap<String, BTreeSet<String>>,
    value_types_by_tag: BTreeMap<String, BTreeSet<String>>,
    property_groups: BTreeMap<String, PropertyTypeGroup>,
    property_mappings: BTreeMap<String, String>,
}

impl RegistrySnapshot {
    /// Number of writes published before this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn taxonomy(&self) -> &TagTaxonomy {
        &self.taxonomy
    }

    // ── Tags ─────────────────────────────────────────────────────

    pub fn get_tag(&self, id: &str) -> Option<&Tag> {
        self.taxonomy.get(id)
    }

    pub fn get_all_tags(&self) -> Vec<&Tag> {
        self.taxonomy.all()
    }

    pub fn get_root_tags(&self) -> Vec<&Tag> {
        self.taxonomy.roots()
    }

    pub fn get_sub_tags(&self, id: &str) -> Vec<&Tag> {
        self.taxonomy.sub_tags(id)
    }

    // ── Condition types ──────────────────────────────────────────

    pub fn get_condition_type(&self, id: &str) -> Option<Arc<ConditionType>> {
        self.condition_types.get(id).cloned()
    }

    pub fn get_all_condition_types(&self) -> Vec<Arc<ConditionType>> {
        self.condition_types.values().cloned().collect()
    }

    /// Condition types carrying `tag_id`, plus those of all transitive
    /// sub-tags when `recursive`. Unknown tag → empty. Sorted by id.
    pub fn get_condition_types_by_tag(&self, tag_id: &str, recursive: bool) -> Vec<Arc<ConditionType>> {
        self.collect_by_tag(&self.condition_types, &self.condition_types_by_tag, tag_id, recursive)
    }

    // ── Action types ─────────────────────────────────────────────

    pub fn get_action_type(&self, id: &str) -> Option<Arc<ActionType>> {
        self.action_types.get(id).cloned()
    }

    pub fn get_all_action_types(&self) -> Vec<Arc<ActionType>> {
        self.action_types.values().cloned().collect()
    }

    pub fn get_action_types_by_tag(&self, tag_id: &str, recursive: bool) -> Vec<Arc<ActionType>> {
        self.collect_by_tag(&self.action_types, &self.action_types_by_tag, tag_id, recursive)
    }

    // ── Value types ──────────────────────────────────────────────

    pub fn get_value_type(&self, id: &str) -> Option<Arc<ValueType>> {
        self.value_types.get(id).cloned()
    }

    pub fn get_all_value_types(&self) -> Vec<Arc<ValueType>> {
        self.value_types.values().cloned().collect()
    }

    pub fn get_value_types_by_tag(&self, tag_id: &str, recursive: bool) -> Vec<Arc<ValueType>> {
        self.collect_by_tag(&self.value_types, &self.value_types_by_tag, tag_id, recursive)
    }

    // ── Property types ───────────────────────────────────────────

    pub fn get_property_type(&self, id: &str) -> Option<Arc<PropertyType>> {
        self.property_types.get(id).cloned()
    }

    /// All property types ordered by `(rank, id)`.
    pub fn get_all_property_types(&self) -> Vec<Arc<PropertyType>> {
        let mut all: Vec<Arc<PropertyType>> = self.property_types.values().cloned().collect();
        all.sort_by(|a, b| a.rank.total_cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Property type groups ordered by `(rank, id)`.
    pub fn get_property_type_groups(&self) -> Vec<&PropertyTypeGroup> {
        let mut groups: Vec<&PropertyTypeGroup> = self.property_groups.values().collect();
        groups.sort_by(|a, b| a.rank.total_cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
        groups
    }

    /// Members of a property group; None when the group is unknown.
    pub fn get_property_types(&self, group_id: &str) -> Option<Vec<Arc<PropertyType>>> {
        let group = self.property_groups.get(group_id)?;
        Some(
            group
                .property_type_ids
                .iter()
                .filter_map(|id| self.property_types.get(id).cloned())
                .collect(),
        )
    }

    /// The property type an incoming property name is automatically mapped to.
    pub fn get_property_type_mapping(&self, from_property: &str) -> Option<&str> {
        self.property_mappings.get(from_property).map(String::as_str)
    }

    // ── Modules ──────────────────────────────────────────────────

    /// Everything `module_id` currently contributes.
    pub fn contributions(&self, module_id: &ModuleId) -> ModuleContributions {
        fn owned<T: PluginType>(table: &BTreeMap<String, Arc<T>>, module_id: &ModuleId) -> BTreeSet<String> {
            table
                .values()
                .filter(|t| t.module_id() == Some(module_id))
                .map(|t| t.id().to_string())
                .collect()
        }
        ModuleContributions {
            tags: self
                .taxonomy
                .all()
                .into_iter()
                .filter(|t| t.module_id.as_ref() == Some(module_id))
                .map(|t| t.id.clone())
                .collect(),
            condition_types: owned(&self.condition_types, module_id),
            action_types: owned(&self.action_types, module_id),
            value_types: owned(&self.value_types, module_id),
            property_types: owned(&self.property_types, module_id),
            property_groups: self
                .declared_groups
                .values()
                .filter(|g| g.module_id.as_ref() == Some(module_id))
                .map(|g| g.id.clone())
                .collect(),
        }
    }

    fn collect_by_tag<T>(
        &self,
        table: &BTreeMap<String, Arc<T>>,
        index: &BTreeMap<String, BTreeSet<String>>,
        tag_id: &str,
        recursive: bool,
    ) -> Vec<Arc<T>> {
        let tags = if recursive {
            self.taxonomy.descendants_and_self(tag_id)
        } else {
            BTreeSet::from([tag_id.to_string()])
        };
        let ids: BTreeSet<&String> = tags
            .iter()
            .filter_map(|tag| index.get(tag))
            .flatten()
            .collect();
        ids.into_iter().filter_map(|id| table.get(id).cloned()).collect()
    }

    // ── Mutation (only on private copies, see DefinitionsRegistry) ──

    /// Drop everything contributed by `module_id`.
    fn retract(&mut self, module_id: &ModuleId) {
        let foreign = |owner: Option<&ModuleId>| owner != Some(module_id);
        self.taxonomy.retain(|t| foreign(t.module_id.as_ref()));
        self.condition_types.retain(|_, t| foreign(t.module_id()));
        self.action_types.retain(|_, t| foreign(t.module_id()));
        self.value_types.retain(|_, t| foreign(t.module_id()));
        self.property_types.retain(|_, t| foreign(t.module_id()));
        self.declared_groups.retain(|_, g| foreign(g.module_id.as_ref()));
    }

    /// Copy the definitions `module_id` contributed to `namespace` into
    /// `batch`, so that retracting the module does not lose them.
    fn carry_over(&self, module_id: &ModuleId, namespace: Namespace, batch: &mut ParsedBatch) {
        fn owned<T: PluginType + Clone>(table: &BTreeMap<String, Arc<T>>, module_id: &ModuleId) -> Vec<T> {
            table
                .values()
                .filter(|t| t.module_id() == Some(module_id))
                .map(|t| T::clone(t))
                .collect()
        }
        let is_owner = |owner: Option<&ModuleId>| owner == Some(module_id);
        match namespace {
            Namespace::Tags => {
                batch.tags = self
                    .taxonomy
                    .all()
                    .into_iter()
                    .filter(|t| is_owner(t.module_id.as_ref()))
                    .cloned()
                    .collect();
            }
            Namespace::Conditions => batch.condition_types = owned(&self.condition_types, module_id),
            Namespace::Actions => batch.action_types = owned(&self.action_types, module_id),
            Namespace::Values => batch.value_types = owned(&self.value_types, module_id),
            Namespace::Properties => {
                batch.property_types = owned(&self.property_types, module_id);
                batch.property_groups = self
                    .declared_groups
                    .values()
                    .filter(|g| is_owner(g.module_id.as_ref()))
                    .cloned()
                    .collect();
            }
            Namespace::Mappings | Namespace::Goals => {}
        }
    }

    fn apply(&mut self, batch: ParsedBatch) {
        for tag in batch.tags {
            self.taxonomy.insert(tag);
        }
        for ct in batch.condition_types {
            self.condition_types.insert(ct.id.clone(), Arc::new(ct));
        }
        for at in batch.action_types {
            self.action_types.insert(at.id.clone(), Arc::new(at));
        }
        for vt in batch.value_types {
            self.value_types.insert(vt.id.clone(), Arc::new(vt));
        }
        for pt in batch.property_types {
            self.property_types.insert(pt.id.clone(), Arc::new(pt));
        }
        for group in batch.property_groups {
            self.declared_groups.insert(group.id.clone(), group);
        }
    }

    /// Second pass: resolve every cross reference and rebuild all indexes.
    fn reindex(&mut self) -> IndexReport {
        let taxonomy = self.taxonomy.rebuild();
        let mut unresolved = Vec::new();

        self.condition_types_by_tag = index_by_tag(
            &mut self.condition_types,
            &self.taxonomy,
            DefinitionKind::ConditionType,
            &mut unresolved,
        );
        for ct in self.condition_types.values_mut() {
            Arc::make_mut(ct).classify();
        }
        self.action_types_by_tag = index_by_tag(
            &mut self.action_types,
            &self.taxonomy,
            DefinitionKind::ActionType,
            &mut unresolved,
        );
        self.value_types_by_tag = index_by_tag(
            &mut self.value_types,
            &self.taxonomy,
            DefinitionKind::ValueType,
            &mut unresolved,
        );
        index_by_tag(
            &mut self.property_types,
            &self.taxonomy,
            DefinitionKind::PropertyType,
            &mut unresolved,
        );

        // Property types: value types, groups and automatic mappings.
        self.property_groups = self
            .declared_groups
            .iter()
            .map(|(id, group)| {
                let mut group = group.clone();
                group.property_type_ids.clear();
                (id.clone(), group)
            })
            .collect();
        self.property_mappings.clear();
        for pt in self.property_types.values_mut() {
            let value_type = self.value_types.get(&pt.value_type_id).cloned();
            if value_type.is_none() {
                unresolved.push(UnresolvedReference {
                    kind: DefinitionKind::PropertyType,
                    owner: pt.id.clone(),
                    reference: pt.value_type_id.clone(),
                });
            }
            Arc::make_mut(pt).value_type = value_type;

            let group = self.property_groups.entry(pt.group_id.clone()).or_insert_with(|| {
                let mut group = PropertyTypeGroup::new(pt.group_id.clone());
                group.implicit = true;
                group
            });
            group.property_type_ids.insert(pt.id.clone());

            for from in &pt.automatic_mappings_from {
                self.property_mappings.insert(from.clone(), pt.id.clone());
            }
        }

        IndexReport { taxonomy, unresolved }
    }
}

/// Resolve the declared tag ids of every entry and build the tag → ids index.
fn index_by_tag<T: PluginType + Clone>(
    table: &mut BTreeMap<String, Arc<T>>,
    taxonomy: &TagTaxonomy,
    kind: DefinitionKind,
    unresolved: &mut Vec<UnresolvedReference>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (id, entry) in table.iter_mut() {
        let mut resolved = BTreeSet::new();
        for tag_id in entry.tag_ids() {
            if taxonomy.contains(tag_id) {
                resolved.insert(tag_id.clone());
                index.entry(tag_id.clone()).or_default().insert(id.clone());
            } else {
                unresolved.push(UnresolvedReference {
                    kind,
                    owner: id.clone(),
                    reference: tag_id.clone(),
                });
            }
        }
        if entry.resolved_tags() != &resolved {
            Arc::make_mut(entry).set_resolved_tags(resolved);
        }
    }
    index
}

/// Log the problems of an index rebuild that concern the given definitions.
fn log_index_report(report: &IndexReport, concerns: impl Fn(DefinitionKind, &str) -> bool) {
    for reference in &report.unresolved {
        if concerns(reference.kind, &reference.owner) {
            tracing::warn!(
                "unknown reference '{}' in {} '{}', dropped",
                reference.reference,
                reference.kind,
                reference.owner
            );
        }
    }
    for orphan in &report.taxonomy.orphans {
        if concerns(DefinitionKind::Tag, orphan) {
            tracing::warn!("tag '{}' has an unknown parent, treating it as a root", orphan);
        }
    }
    for cycle in &report.taxonomy.cycles {
        if cycle.iter().any(|id| concerns(DefinitionKind::Tag, id)) {
            tracing::error!("{}", DefinitionError::TagCycle(cycle.clone()));
        }
    }
}

/// The hot-reloadable definitions registry.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct DefinitionsRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    writer: Mutex<()>,
}

impl DefinitionsRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            writer: Mutex::new(()),
        }
    }

    /// The current fully-indexed snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ids of everything `module_id` currently contributes.
    pub fn types_by_module(&self, module_id: &ModuleId) -> ModuleContributions {
        self.snapshot().contributions(module_id)
    }

    /// Copy the current snapshot, let `change` modify the copy, then swap it in.
    fn publish<R>(&self, change: impl FnOnce(&mut RegistrySnapshot) -> R) -> R {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = RegistrySnapshot::clone(&self.snapshot());
        let result = change(&mut next);
        next.generation += 1;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        result
    }

    pub fn register_tag(&self, tag: Tag) {
        let id = tag.id.clone();
        self.publish(|next| {
            next.taxonomy.insert(tag);
            let report = next.reindex();
            log_index_report(&report, |kind, owner| kind == DefinitionKind::Tag && owner == id);
        });
    }

    pub fn register_condition_type(&self, condition_type: ConditionType) {
        let id = condition_type.id.clone();
        self.publish(|next| {
            next.condition_types.insert(id.clone(), Arc::new(condition_type));
            let report = next.reindex();
            log_index_report(&report, |kind, owner| {
                kind == DefinitionKind::ConditionType && owner == id
            });
        });
    }

    pub fn register_action_type(&self, action_type: ActionType) {
        let id = action_type.id.clone();
        self.publish(|next| {
            next.action_types.insert(id.clone(), Arc::new(action_type));
            let report = next.reindex();
            log_index_report(&report, |kind, owner| kind == DefinitionKind::ActionType && owner == id);
        });
    }

    pub fn register_value_type(&self, value_type: ValueType) {
        let id = value_type.id.clone();
        self.publish(|next| {
            next.value_types.insert(id.clone(), Arc::new(value_type));
            let report = next.reindex();
            log_index_report(&report, |kind, owner| kind == DefinitionKind::ValueType && owner == id);
        });
    }

    pub fn register_property_type(&self, property_type: PropertyType) {
        let id = property_type.id.clone();
        self.publish(|next| {
            next.property_types.insert(id.clone(), Arc::new(property_type));
            let report = next.reindex();
            log_index_report(&report, |kind, owner| {
                kind == DefinitionKind::PropertyType && owner == id
            });
        });
    }

    /// Activate (or re-activate) a module: create its store mappings, then
    /// parse tags, condition, action, value and property types in that
    /// order, replace everything the module contributed before and publish
    /// the result as one snapshot.
    ///
    /// Documents that fail to parse are logged and skipped; they never abort
    /// the rest of the load. A namespace the source cannot list keeps what
    /// the module contributed to it before.
    pub fn load_module(&self, source: &dyn ModuleSource, mappings: Option<&dyn MappingSink>) -> LoadReport {
        let module_id = source.module_id();
        let mut report = LoadReport::new(module_id.clone());
        tracing::info!("loading definitions from module '{}'", module_id);

        let mut batch = ParsedBatch::default();
        let mut unlisted = Vec::new();
        for namespace in Namespace::REGISTRY_LOAD_ORDER {
            let documents = match source.documents(namespace) {
                Ok(documents) => documents,
                Err(e) => {
                    tracing::error!("{}", e);
                    report.failures.push(e);
                    unlisted.push(namespace);
                    continue;
                }
            };
            match namespace {
                Namespace::Mappings => {
                    if let Some(sink) = mappings {
                        create_mappings(sink, &documents, &mut report);
                    }
                }
                Namespace::Tags => {
                    batch.tags = parse_all(&module_id, namespace, &documents, &mut report);
                }
                Namespace::Conditions => {
                    batch.condition_types = parse_all(&module_id, namespace, &documents, &mut report);
                }
                Namespace::Actions => {
                    batch.action_types = parse_all(&module_id, namespace, &documents, &mut report);
                }
                Namespace::Values => {
                    batch.value_types = parse_all(&module_id, namespace, &documents, &mut report);
                }
                Namespace::Properties => {
                    let (groups, types): (Vec<DefinitionDocument>, Vec<DefinitionDocument>) = documents
                        .into_iter()
                        .partition(|d| d.name.ends_with(PROPERTY_GROUP_SUFFIX));
                    batch.property_groups = parse_all(&module_id, namespace, &groups, &mut report);
                    batch.property_types = parse_all(&module_id, namespace, &types, &mut report);
                }
                Namespace::Goals => {}
            }
        }
        self.publish(|next| {
            let previous = next.contributions(&module_id);
            for namespace in unlisted {
                next.carry_over(&module_id, namespace, &mut batch);
            }
            next.retract(&module_id);
            next.apply(batch);
            let index = next.reindex();
            let current = next.contributions(&module_id);
            log_index_report(&index, |kind, owner| current.contains(kind, owner));
            report.removed = previous.difference(&current);
        });
        report
    }

    /// Deactivate a module: retract every definition it contributed and
    /// return what was removed. Unloading an unknown module is a no-op.
    pub fn unload_module(&self, module_id: &ModuleId) -> ModuleContributions {
        self.publish(|next| {
            let removed = next.contributions(module_id);
            if !removed.is_empty() {
                next.retract(module_id);
                next.reindex();
                tracing::info!(
                    "retracted module '{}': {} tags, {} condition types, {} action types, {} value types, {} property types",
                    module_id,
                    removed.tags.len(),
                    removed.condition_types.len(),
                    removed.action_types.len(),
                    removed.value_types.len(),
                    removed.property_types.len()
                );
            }
            removed
        })
    }
}

impl Default for DefinitionsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Loader hook for tagging parsed definitions with their module.
trait OwnedByModule {
    fn assign_module(&mut self, module_id: &ModuleId);
}

macro_rules! impl_owned_by_module {
    ($($ty:ty),+) => {
        $(
            impl OwnedByModule for $ty {
                fn assign_module(&mut self, module_id: &ModuleId) {
                    self.module_id = Some(module_id.clone());
                }
            }
        )+
    };
}

impl_owned_by_module!(Tag, ConditionType, ActionType, ValueType, PropertyType, PropertyTypeGroup);

fn parse_all<T: DeserializeOwned + OwnedByModule>(
    module_id: &ModuleId,
    namespace: Namespace,
    documents: &[DefinitionDocument],
    report: &mut LoadReport,
) -> Vec<T> {
    let mut parsed = Vec::with_capacity(documents.len());
    for document in documents {
        tracing::debug!("found {} definition at {}, loading...", namespace, document.origin);
        match serde_json::from_str::<T>(&document.content) {
            Ok(mut definition) => {
                definition.assign_module(module_id);
                parsed.push(definition);
                *report.loaded.entry(namespace).or_default() += 1;
            }
            Err(source) => {
                let error = DefinitionError::Parse {
                    namespace,
                    origin: document.origin.clone(),
                    source,
                };
                tracing::error!("{}", error);
                report.failures.push(error);
            }
        }
    }
    parsed
}

fn create_mappings(sink: &dyn MappingSink, documents: &[DefinitionDocument], report: &mut LoadReport) {
    for document in documents {
        tracing::debug!("found mapping at {}, loading...", document.origin);
        match sink.create_mapping(&document.name, &document.content) {
            Ok(()) => *report.loaded.entry(Namespace::Mappings).or_default() += 1,
            Err(e) => {
                tracing::error!("{}", e);
                report.failures.push(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::StaticModule;
    use crate::types::ConditionCategory;
    use std::cell::RefCell;

    fn ids<T: PluginType>(types: &[Arc<T>]) -> BTreeSet<String> {
        types.iter().map(|t| t.id().to_string()).collect()
    }

    fn base_module() -> StaticModule {
        StaticModule::new("base")
            .with_document(Namespace::Tags, "condition", r#"{"id": "condition"}"#)
            .with_document(
                Namespace::Tags,
                "profileCondition",
                r#"{"id": "profileCondition", "parent": "condition", "rank": 2.0}"#,
            )
            .with_document(
                Namespace::Tags,
                "sessionCondition",
                r#"{"id": "sessionCondition", "parent": "condition", "rank": 1.0}"#,
            )
            .with_document(
                Namespace::Tags,
                "eventCondition",
                r#"{"id": "eventCondition", "parent": "sessionCondition"}"#,
            )
            .with_document(
                Namespace::Conditions,
                "profileProperty",
                r#"{"id": "profilePropertyCondition", "tags": ["profileCondition", "condition"]}"#,
            )
            .with_document(
                Namespace::Conditions,
                "sessionProperty",
                r#"{"id": "sessionPropertyCondition", "tags": ["sessionCondition"]}"#,
            )
            .with_document(
                Namespace::Conditions,
                "sessionEvent",
                r#"{"id": "sessionEventCondition", "tags": ["eventCondition", "notATag"]}"#,
            )
            .with_document(Namespace::Actions, "setProperty", r#"{"id": "setPropertyAction", "tags": ["condition"]}"#)
            .with_document(Namespace::Values, "integer", r#"{"id": "integer", "tags": ["condition"]}"#)
            .with_document(Namespace::Values, "string", r#"{"id": "string"}"#)
            .with_document(
                Namespace::Properties,
                "basicPropertyGroup",
                r#"{"id": "basic", "rank": 1.0}"#,
            )
            .with_document(
                Namespace::Properties,
                "age",
                r#"{"id": "age", "type": "integer", "groupId": "basic", "automaticMappingsFrom": ["j:age"]}"#,
            )
            .with_document(
                Namespace::Properties,
                "city",
                r#"{"id": "city", "type": "missingValueType", "groupId": "location"}"#,
            )
    }

    fn loaded_registry() -> DefinitionsRegistry {
        let registry = DefinitionsRegistry::new();
        let report = registry.load_module(&base_module(), None);
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        registry
    }

    #[test]
    fn load_module_indexes_everything() {
        let registry = loaded_registry();
        let snapshot = registry.snapshot();

        assert_eq!(snapshot.get_all_tags().len(), 4);
        let roots: Vec<&str> = snapshot.get_root_tags().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(roots, vec!["condition"]);
        assert_eq!(snapshot.get_all_condition_types().len(), 3);
        assert!(snapshot.get_action_type("setPropertyAction").is_some());
        assert_eq!(snapshot.get_all_value_types().len(), 2);
        assert_eq!(snapshot.generation(), 1);
    }

    #[test]
    fn categories_are_assigned_at_registration() {
        let snapshot = loaded_registry().snapshot();
        let category = |id: &str| snapshot.get_condition_type(id).unwrap().category;
        assert_eq!(category("profilePropertyCondition"), ConditionCategory::Profile);
        assert_eq!(category("sessionPropertyCondition"), ConditionCategory::Session);
        assert_eq!(category("sessionEventCondition"), ConditionCategory::Event);
    }

    #[test]
    fn unknown_tags_are_dropped_not_fatal() {
        let snapshot = loaded_registry().snapshot();
        let ct = snapshot.get_condition_type("sessionEventCondition").unwrap();
        assert!(ct.tag_ids.contains("notATag"));
        assert!(!ct.resolved_tags.contains("notATag"));
        assert!(ct.resolved_tags.contains("eventCondition"));
    }

    #[test]
    fn by_tag_direct_and_recursive() {
        let snapshot = loaded_registry().snapshot();

        let direct = ids(&snapshot.get_condition_types_by_tag("condition", false));
        assert_eq!(direct, BTreeSet::from(["profilePropertyCondition".to_string()]));

        let recursive = ids(&snapshot.get_condition_types_by_tag("condition", true));
        assert!(recursive.is_superset(&direct));
        assert_eq!(recursive.len(), 3);

        let from_session = ids(&snapshot.get_condition_types_by_tag("sessionCondition", true));
        assert_eq!(
            from_session,
            BTreeSet::from([
                "sessionEventCondition".to_string(),
                "sessionPropertyCondition".to_string()
            ])
        );
    }

    #[test]
    fn recursive_equals_union_over_sub_tags() {
        let snapshot = loaded_registry().snapshot();
        for tag in snapshot.get_all_tags() {
            let recursive = ids(&snapshot.get_condition_types_by_tag(&tag.id, true));
            let mut union = BTreeSet::new();
            for sub in snapshot.taxonomy().descendants_and_self(&tag.id) {
                union.extend(ids(&snapshot.get_condition_types_by_tag(&sub, false)));
            }
            assert_eq!(recursive, union, "tag {}", tag.id);
        }
    }

    #[test]
    fn unknown_tag_lookup_is_empty() {
        let snapshot = loaded_registry().snapshot();
        assert!(snapshot.get_condition_types_by_tag("nope", true).is_empty());
        assert!(snapshot.get_action_types_by_tag("nope", false).is_empty());
        assert!(snapshot.get_value_types_by_tag("nope", true).is_empty());
    }

    #[test]
    fn action_and_value_types_by_tag() {
        let snapshot = loaded_registry().snapshot();
        assert_eq!(snapshot.get_action_types_by_tag("condition", false).len(), 1);
        assert_eq!(snapshot.get_value_types_by_tag("condition", true).len(), 1);
    }

    #[test]
    fn property_groups_and_mappings() {
        let snapshot = loaded_registry().snapshot();

        assert_eq!(snapshot.get_property_type_mapping("j:age"), Some("age"));
        assert_eq!(snapshot.get_property_type_mapping("j:unknown"), None);

        let basic = snapshot.get_property_types("basic").unwrap();
        assert_eq!(basic.len(), 1);
        assert!(basic[0].value_type.is_some());

        // "location" has no group document and is created implicitly.
        let groups: Vec<&str> = snapshot
            .get_property_type_groups()
            .iter()
            .map(|g| g.id.as_str())
            .collect();
        assert_eq!(groups, vec!["location", "basic"]);
        let city = snapshot.get_property_type("city").unwrap();
        assert!(city.value_type.is_none());
        assert!(snapshot.get_property_types("nope").is_none());
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let registry = DefinitionsRegistry::new();
        registry.register_tag(Tag::new("t"));
        let ct = ConditionType::new("c").with_tag("t");
        registry.register_condition_type(ct.clone());
        let once = registry.snapshot();
        registry.register_condition_type(ct);
        let twice = registry.snapshot();

        assert_eq!(
            ids(&once.get_all_condition_types()),
            ids(&twice.get_all_condition_types())
        );
        assert_eq!(twice.get_condition_types_by_tag("t", false).len(), 1);

        let loaded = DefinitionsRegistry::new();
        loaded.load_module(&base_module(), None);
        let first = loaded.snapshot();
        loaded.load_module(&base_module(), None);
        let second = loaded.snapshot();
        assert_eq!(
            ids(&first.get_all_condition_types()),
            ids(&second.get_all_condition_types())
        );
        assert_eq!(
            first.taxonomy().edges(),
            second.taxonomy().edges()
        );
    }

    #[test]
    fn type_registered_before_its_tag_resolves_later() {
        let registry = DefinitionsRegistry::new();
        registry.register_condition_type(ConditionType::new("c").with_tag("late"));
        assert!(registry.snapshot().get_condition_types_by_tag("late", false).is_empty());

        registry.register_tag(Tag::new("late"));
        assert_eq!(registry.snapshot().get_condition_types_by_tag("late", false).len(), 1);
    }

    #[test]
    fn parse_failure_skips_only_that_document() {
        let module = StaticModule::new("broken")
            .with_document(Namespace::Tags, "ok", r#"{"id": "ok"}"#)
            .with_document(Namespace::Tags, "bad", r#"{"id": 12"#)
            .with_document(Namespace::Conditions, "c", r#"{"id": "c", "tags": ["ok"]}"#);
        let registry = DefinitionsRegistry::new();
        let report = registry.load_module(&module, None);

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], DefinitionError::Parse { .. }));
        assert_eq!(report.loaded_count(Namespace::Tags), 1);
        assert_eq!(report.loaded_count(Namespace::Conditions), 1);
        assert!(registry.snapshot().get_tag("ok").is_some());
    }

    #[test]
    fn unload_retracts_module_definitions() {
        let registry = loaded_registry();
        let extra = StaticModule::new("extra").with_document(
            Namespace::Conditions,
            "custom",
            r#"{"id": "customCondition", "tags": ["profileCondition"]}"#,
        );
        registry.load_module(&extra, None);
        assert_eq!(
            registry.snapshot().get_condition_types_by_tag("profileCondition", false).len(),
            2
        );

        let removed = registry.unload_module(&ModuleId::from("extra"));
        assert_eq!(removed.condition_types, BTreeSet::from(["customCondition".to_string()]));
        let snapshot = registry.snapshot();
        assert!(snapshot.get_condition_type("customCondition").is_none());
        assert_eq!(snapshot.get_condition_types_by_tag("profileCondition", false).len(), 1);

        // Idempotent.
        assert!(registry.unload_module(&ModuleId::from("extra")).is_empty());
    }

    #[test]
    fn overwritten_definition_survives_original_module_unload() {
        let registry = DefinitionsRegistry::new();
        let a = StaticModule::new("a").with_document(Namespace::Conditions, "x", r#"{"id": "x"}"#);
        let b = StaticModule::new("b").with_document(Namespace::Conditions, "x", r#"{"id": "x"}"#);
        registry.load_module(&a, None);
        registry.load_module(&b, None);

        assert!(registry.unload_module(&ModuleId::from("a")).is_empty());
        assert!(registry.snapshot().get_condition_type("x").is_some());
    }

    #[test]
    fn reload_reports_removed_definitions() {
        let registry = DefinitionsRegistry::new();
        let v1 = StaticModule::new("m")
            .with_document(Namespace::Conditions, "x", r#"{"id": "x"}"#)
            .with_document(Namespace::Conditions, "y", r#"{"id": "y"}"#);
        let v2 = StaticModule::new("m").with_document(Namespace::Conditions, "x", r#"{"id": "x"}"#);
        registry.load_module(&v1, None);
        let report = registry.load_module(&v2, None);

        assert_eq!(report.removed.condition_types, BTreeSet::from(["y".to_string()]));
        assert!(registry.snapshot().get_condition_type("y").is_none());
    }

    #[test]
    fn unlistable_namespace_keeps_previous_definitions() {
        struct BrokenConditions(StaticModule);
        impl ModuleSource for BrokenConditions {
            fn module_id(&self) -> ModuleId {
                self.0.module_id()
            }
            fn documents(&self, namespace: Namespace) -> Result<Vec<DefinitionDocument>, DefinitionError> {
                if namespace == Namespace::Conditions {
                    return Err(DefinitionError::Source {
                        module_id: self.0.module_id(),
                        namespace,
                        reason: "permission denied".to_string(),
                    });
                }
                self.0.documents(namespace)
            }
        }

        let registry = DefinitionsRegistry::new();
        let v1 = StaticModule::new("m")
            .with_document(Namespace::Tags, "t", r#"{"id": "eventCondition"}"#)
            .with_document(Namespace::Conditions, "x", r#"{"id": "x", "tags": ["eventCondition"]}"#)
            .with_document(Namespace::Actions, "a", r#"{"id": "a"}"#);
        let v2 = StaticModule::new("m")
            .with_document(Namespace::Tags, "t", r#"{"id": "eventCondition"}"#)
            .with_document(Namespace::Conditions, "x", r#"{"id": "x", "tags": ["eventCondition"]}"#);
        registry.load_module(&v1, None);
        let report = registry.load_module(&BrokenConditions(v2), None);

        assert_eq!(report.failures.len(), 1);
        assert!(report.removed.condition_types.is_empty());
        assert_eq!(report.removed.action_types, BTreeSet::from(["a".to_string()]));

        let snapshot = registry.snapshot();
        let x = snapshot.get_condition_type("x").unwrap();
        assert_eq!(x.module_id(), Some(&ModuleId::new("m")));
        assert_eq!(x.category, ConditionCategory::Event);
        assert_eq!(snapshot.get_condition_types_by_tag("eventCondition", false).len(), 1);
    }

    #[test]
    fn mappings_are_forwarded_first() {
        struct Recorder(RefCell<Vec<String>>);
        impl MappingSink for Recorder {
            fn create_mapping(&self, name: &str, _mapping: &str) -> Result<(), DefinitionError> {
                self.0.borrow_mut().push(name.to_string());
                if name == "broken" {
                    return Err(DefinitionError::Mapping {
                        name: name.to_string(),
                        reason: "rejected".to_string(),
                    });
                }
                Ok(())
            }
        }

        let module = StaticModule::new("m")
            .with_document(Namespace::Mappings, "session", "{}")
            .with_document(Namespace::Mappings, "broken", "{}");
        let recorder = Recorder(RefCell::new(Vec::new()));
        let registry = DefinitionsRegistry::new();
        let report = registry.load_module(&module, Some(&recorder));

        assert_eq!(*recorder.0.borrow(), vec!["session".to_string(), "broken".to_string()]);
        assert_eq!(report.loaded_count(Namespace::Mappings), 1);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn readers_keep_a_consistent_snapshot_during_reload() {
        let registry = Arc::new(loaded_registry());
        let held = registry.snapshot();

        std::thread::scope(|scope| {
            let writer = Arc::clone(&registry);
            scope.spawn(move || {
                for i in 0..50 {
                    let module = StaticModule::new(format!("m{}", i % 5)).with_document(
                        Namespace::Conditions,
                        "c",
                        format!(r#"{{"id": "c{}", "tags": ["profileCondition"]}}"#, i % 5),
                    );
                    writer.load_module(&module, None);
                }
            });
            for _ in 0..4 {
                let reader = Arc::clone(&registry);
                scope.spawn(move || {
                    for _ in 0..200 {
                        let snapshot = reader.snapshot();
                        let by_tag = snapshot.get_condition_types_by_tag("profileCondition", false);
                        // Every id in the index resolves and appears once.
                        let unique = ids(&by_tag);
                        assert_eq!(unique.len(), by_tag.len());
                        for ct in &by_tag {
                            assert!(snapshot.get_condition_type(&ct.id).is_some());
                        }
                    }
                });
            }
        });

        // The snapshot taken before the reloads is untouched.
        assert_eq!(held.get_condition_types_by_tag("profileCondition", false).len(), 1);
        assert_eq!(
            registry
                .snapshot()
                .get_condition_types_by_tag("profileCondition", false)
                .len(),
            6
        );
    }
}
