// service.rs — PersistenceService: the store collaborator interface.
//
// Everything the condition engine and the goal engine need from a store:
// item CRUD, condition queries, counts, aggregates, in-memory matching of a
// single item, and mapping creation for module-declared mappings. The
// durable search-engine store lives behind this trait elsewhere;
// `MemoryStore` is the in-process implementation.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use ctx_definitions::{Condition, DefinitionError, MappingSink};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::item::Item;

/// Key under which `aggregate_query` reports the total number of matched items.
pub const FILTERED_COUNT_KEY: &str = "_filtered";

/// `(bucket key, count)` pairs as ranked by the store.
pub type BucketCounts = Vec<(String, u64)>;

/// Bucket width of a date aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateInterval {
    #[default]
    Day,
    Month,
    Year,
}

impl DateInterval {
    /// Bucket key of a timestamp.
    pub fn bucket(&self, time: &DateTime<Utc>) -> String {
        match self {
            DateInterval::Day => time.format("%Y-%m-%d").to_string(),
            DateInterval::Month => format!("{:04}-{:02}", time.year(), time.month()),
            DateInterval::Year => format!("{:04}", time.year()),
        }
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateInterval::Day => write!(f, "day"),
            DateInterval::Month => write!(f, "month"),
            DateInterval::Year => write!(f, "year"),
        }
    }
}

/// How `aggregate_query` buckets matched items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateKind {
    /// Bucket by a date field truncated to the interval.
    Date { interval: DateInterval },
    /// Bucket by the distinct values of a field.
    Terms,
}

/// An aggregate over one field of the matched items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub kind: AggregateKind,
    pub field: String,
}

impl Aggregate {
    pub fn date(field: impl Into<String>, interval: DateInterval) -> Self {
        Self {
            kind: AggregateKind::Date { interval },
            field: field.into(),
        }
    }

    pub fn terms(field: impl Into<String>) -> Self {
        Self {
            kind: AggregateKind::Terms,
            field: field.into(),
        }
    }
}

/// The store collaborator.
///
/// Implementations must be usable from several threads: the evaluation
/// engine and the reporter call it synchronously from caller threads.
pub trait PersistenceService: Send + Sync {
    /// Load one item; None when absent.
    fn load(&self, item_type: &str, item_id: &str) -> Result<Option<Item>, StoreError>;

    /// Create or overwrite an item.
    fn save(&self, item: &Item) -> Result<(), StoreError>;

    /// Delete an item. Returns whether it existed.
    fn remove(&self, item_type: &str, item_id: &str) -> Result<bool, StoreError>;

    /// Every item of a type.
    fn get_all_items(&self, item_type: &str) -> Result<Vec<Item>, StoreError>;

    /// Items of `item_type` matching `condition`, ascending by `sort_by` when given.
    fn query(&self, condition: &Condition, sort_by: Option<&str>, item_type: &str) -> Result<Vec<Item>, StoreError>;

    /// Number of items of `item_type` matching `condition`.
    fn query_count(&self, condition: &Condition, item_type: &str) -> Result<u64, StoreError>;

    /// Bucket counts of the matching items, in the store's bucket order.
    /// The result always carries the total match count under
    /// [`FILTERED_COUNT_KEY`].
    fn aggregate_query(
        &self,
        condition: &Condition,
        aggregate: &Aggregate,
        item_type: &str,
    ) -> Result<BucketCounts, StoreError>;

    /// Whether a single in-hand item satisfies `condition`.
    fn test_match(&self, condition: &Condition, item: &Item) -> Result<bool, StoreError>;

    /// Register a mapping document for an item type.
    fn create_mapping(&self, item_type: &str, mapping: &str) -> Result<(), StoreError>;
}

/// Forwards module-declared mappings to a store.
pub struct StoreMappings<'a>(pub &'a dyn PersistenceService);

impl MappingSink for StoreMappings<'_> {
    fn create_mapping(&self, name: &str, mapping: &str) -> Result<(), DefinitionError> {
        self.0
            .create_mapping(name, mapping)
            .map_err(|e| DefinitionError::Mapping {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}
