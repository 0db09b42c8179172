//! # ctx-store
//!
//! Store interface and item model for the context server.
//!
//! The condition engine and goal engine never talk to a concrete database;
//! they go through the [`PersistenceService`] trait. The durable store is
//! deployed separately. [`MemoryStore`] is the in-process implementation
//! used by the CLI, embedders and tests: it keeps items in memory, mirrors
//! them to JSON files when given a directory, and interprets conditions with
//! a set of built-in predicates.
//!
//! ## Key components
//!
//! - [`PersistenceService`] — the store collaborator (CRUD, query, count, aggregate, match)
//! - [`Item`] / [`ItemType`] — stored documents and typed entities ([`Profile`], [`Session`], [`Event`])
//! - [`Aggregate`] — date and terms bucketing, with the `_filtered` total
//! - [`MemoryStore`] — in-memory store with optional per-item JSON persistence
//! - [`StoreMappings`] — forwards module-declared mappings to a store

pub mod error;
pub mod item;
pub mod memory;
pub mod predicate;
pub mod service;

pub use error::StoreError;
pub use item::{Event, Item, ItemType, Profile, Session};
pub use memory::MemoryStore;
pub use predicate::{compare_values, values_equal, Predicates};
pub use service::{
    Aggregate, AggregateKind, BucketCounts, DateInterval, PersistenceService, StoreMappings, FILTERED_COUNT_KEY,
};
