//! Quarry: a search, filter, sort and paging engine for entity list endpoints.
//!
//! An entity declares which of its fields clients may search, filter and
//! sort on ([`EntityQueryMetadata`] / [`QueryableEntity`]). The engine turns
//! untrusted request parameters into a validated [`QueryPlan`] and runs it
//! against a [`QueryStore`] in a single round trip.

pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod store;

pub use error::{QueryError, QueryResult};
pub use query::{
    EntityQueryMetadata, QueryExecutor, QueryParameters, QueryPlan, QueryableEntity, ResultPage,
};
pub use store::{MemoryStore, PgJsonStore, PgStore, QueryStore};
