//! Store adapters that execute query plans.
//!
//! - `PgStore` / `PgJsonStore`: SQL via SeaQuery, run through sqlx
//! - `MemoryStore`: plans interpreted over in-memory JSON rows

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::QueryResult;
use crate::query::QueryPlan;

pub use memory::MemoryStore;
pub use postgres::{PgJsonStore, PgStore, SqlRenderer};

/// Backend that can run a planned list query.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Row type produced for each matching entity.
    type Row: Send;

    /// Fetch the plan's page and the total number of matching base rows.
    async fn fetch_page(&self, plan: &QueryPlan) -> QueryResult<(Vec<Self::Row>, u64)>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
