// memory.rs — MemoryStore: in-process PersistenceService.
//
// Items live in memory, grouped by item type. When opened on a directory
// every write is mirrored to `<data_dir>/<item_type>/<item_id>.json` and the
// directory is read back on open, so goals, rules and recorded sessions
// survive restarts. Mappings are kept under `<data_dir>/_mappings/`.
//
// Queries scan linearly and interpret conditions with the built-in
// predicates in `predicate.rs`. When a registry is attached, unresolved
// conditions get their predicate name from the registered condition type.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use ctx_definitions::{Condition, DefinitionsRegistry};
use serde_json::Value;

use crate::error::StoreError;
use crate::item::Item;
use crate::predicate::{compare_values, parse_time, Predicates};
use crate::service::{Aggregate, AggregateKind, BucketCounts, PersistenceService, FILTERED_COUNT_KEY};

const MAPPINGS_DIR: &str = "_mappings";

/// In-memory store with optional JSON file persistence.
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<String, BTreeMap<String, Item>>>,
    mappings: RwLock<BTreeMap<String, Value>>,
    data_dir: Option<PathBuf>,
    registry: Option<Arc<DefinitionsRegistry>>,
}

impl MemoryStore {
    /// A purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store persisted under `data_dir`. Creates the directory if it
    /// doesn't exist and loads every item already there.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            path: data_dir.clone(),
            source,
        })?;

        let mut items: BTreeMap<String, BTreeMap<String, Item>> = BTreeMap::new();
        let mut mappings = BTreeMap::new();
        for type_dir in read_dir(&data_dir)? {
            if !type_dir.is_dir() {
                continue;
            }
            let is_mappings = type_dir.file_name().is_some_and(|n| n == MAPPINGS_DIR);
            for path in read_dir(&type_dir)? {
                if !path.extension().is_some_and(|ext| ext == "json") {
                    continue;
                }
                let json = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                if is_mappings {
                    let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                    mappings.insert(name, serde_json::from_str(&json)?);
                } else {
                    let item: Item = serde_json::from_str(&json)?;
                    items
                        .entry(item.item_type.clone())
                        .or_default()
                        .insert(item.item_id.clone(), item);
                }
            }
        }
        let count: usize = items.values().map(BTreeMap::len).sum();
        tracing::debug!("opened store at {} with {} items", data_dir.display(), count);

        Ok(Self {
            items: RwLock::new(items),
            mappings: RwLock::new(mappings),
            data_dir: Some(data_dir),
            registry: None,
        })
    }

    /// Attach the definitions registry used to name predicates of
    /// unresolved conditions.
    pub fn with_registry(mut self, registry: Arc<DefinitionsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The mapping registered for an item type.
    pub fn mapping(&self, item_type: &str) -> Option<Value> {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(item_type)
            .cloned()
    }

    /// Number of stored items of a type.
    pub fn count(&self, item_type: &str) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(item_type)
            .map_or(0, BTreeMap::len)
    }

    fn item_file(&self, item_type: &str, item_id: &str) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(file_safe(item_type)).join(format!("{}.json", file_safe(item_id))))
    }

    /// Items of a type that match `condition`, in id order.
    fn matching(&self, condition: &Condition, item_type: &str) -> Result<Vec<Item>, StoreError> {
        let snapshot = self.registry.as_ref().map(|r| r.snapshot());
        let predicates = Predicates::new(snapshot.as_deref());
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        let mut matched = Vec::new();
        if let Some(items) = items.get(item_type) {
            for item in items.values() {
                if predicates.matches(condition, item)? {
                    matched.push(item.clone());
                }
            }
        }
        Ok(matched)
    }
}

impl PersistenceService for MemoryStore {
    fn load(&self, item_type: &str, item_id: &str) -> Result<Option<Item>, StoreError> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(item_type).and_then(|m| m.get(item_id)).cloned())
    }

    fn save(&self, item: &Item) -> Result<(), StoreError> {
        if let Some(path) = self.item_file(&item.item_type, &item.item_id) {
            write_json(&path, &serde_json::to_string_pretty(item)?)?;
        }
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(item.item_type.clone())
            .or_default()
            .insert(item.item_id.clone(), item.clone());
        Ok(())
    }

    fn remove(&self, item_type: &str, item_id: &str) -> Result<bool, StoreError> {
        let removed = self
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(item_type)
            .and_then(|m| m.remove(item_id))
            .is_some();
        if let Some(path) = self.item_file(item_type, item_id) {
            if path.exists() {
                fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;
            }
        }
        Ok(removed)
    }

    fn get_all_items(&self, item_type: &str) -> Result<Vec<Item>, StoreError> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items
            .get(item_type)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    fn query(&self, condition: &Condition, sort_by: Option<&str>, item_type: &str) -> Result<Vec<Item>, StoreError> {
        let mut matched = self.matching(condition, item_type)?;
        if let Some(field) = sort_by {
            // Items without the field sort last.
            matched.sort_by(|a, b| match (a.field_value(field), b.field_value(field)) {
                (Some(x), Some(y)) => compare_values(&x, &y).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        Ok(matched)
    }

    fn query_count(&self, condition: &Condition, item_type: &str) -> Result<u64, StoreError> {
        Ok(self.matching(condition, item_type)?.len() as u64)
    }

    fn aggregate_query(
        &self,
        condition: &Condition,
        aggregate: &Aggregate,
        item_type: &str,
    ) -> Result<BucketCounts, StoreError> {
        let matched = self.matching(condition, item_type)?;
        let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
        for item in &matched {
            let Some(value) = item.field_value(&aggregate.field) else {
                continue;
            };
            let keys = match &aggregate.kind {
                AggregateKind::Date { interval } => match parse_time(&value) {
                    Some(time) => vec![interval.bucket(&time)],
                    None => {
                        tracing::debug!(
                            "item {} has no date in '{}', not bucketed",
                            item.item_id,
                            aggregate.field
                        );
                        Vec::new()
                    }
                },
                AggregateKind::Terms => term_keys(&value),
            };
            for key in keys {
                *buckets.entry(key).or_default() += 1;
            }
        }
        // Date buckets run chronologically, term buckets by descending count.
        let mut ranked: BucketCounts = buckets.into_iter().collect();
        if matches!(aggregate.kind, AggregateKind::Terms) {
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        }
        ranked.push((FILTERED_COUNT_KEY.to_string(), matched.len() as u64));
        Ok(ranked)
    }

    fn test_match(&self, condition: &Condition, item: &Item) -> Result<bool, StoreError> {
        let snapshot = self.registry.as_ref().map(|r| r.snapshot());
        Predicates::new(snapshot.as_deref()).matches(condition, item)
    }

    fn create_mapping(&self, item_type: &str, mapping: &str) -> Result<(), StoreError> {
        let parsed: Value = serde_json::from_str(mapping)?;
        if let Some(dir) = &self.data_dir {
            let path = dir.join(MAPPINGS_DIR).join(format!("{}.json", file_safe(item_type)));
            write_json(&path, mapping)?;
        }
        tracing::debug!("created mapping for item type '{}'", item_type);
        self.mappings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item_type.to_string(), parsed);
        Ok(())
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn write_json(path: &Path, json: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Keep ids usable as file names.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

fn term_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(term_keys).collect(),
        other => vec![other.to_string()],
    }
}
