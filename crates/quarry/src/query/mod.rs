//! List query engine.
//!
//! This module provides:
//! - Metadata: the per-entity contract (allow-lists, aliases, collections, types)
//! - QueryParameters: normalized paging, sort, search and raw filters
//! - FilterClause / FilterValue: `field:operation:value` parsing and casting
//! - PredicateBuilder: validated, store-agnostic predicate trees
//! - QueryPlan / QueryExecutor: one round trip to a store, one ResultPage back

pub mod executor;
pub mod filter;
pub mod metadata;
pub mod params;
pub mod plan;
pub mod predicate;
pub mod sort;
pub mod types;

pub use executor::QueryExecutor;
pub use filter::{FilterClause, FilterOperation, FilterValue};
pub use metadata::{
    CollectionRelation, EntityQueryMetadata, FieldDescriptor, FieldRef, FieldType,
    QueryableEntity, RelationJoin,
};
pub use params::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE, ListRequest, MAX_PAGE_SIZE, QueryParameters};
pub use plan::QueryPlan;
pub use predicate::{BuiltPredicate, Comparison, Predicate, PredicateBuilder};
pub use sort::{SortDirection, SortOrder, resolve_sort};
pub use types::ResultPage;
