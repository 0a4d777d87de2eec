//! Query execution.

use super::metadata::{EntityQueryMetadata, QueryableEntity};
use super::params::QueryParameters;
use super::plan::QueryPlan;
use super::types::ResultPage;
use crate::error::QueryResult;
use crate::store::QueryStore;

/// Runs list queries against a store.
///
/// Stateless apart from the store handle; one executor can serve every
/// entity type concurrently.
pub struct QueryExecutor<S> {
    store: S,
}

impl<S: QueryStore> QueryExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate metadata and request, producing the plan without touching
    /// the store.
    pub fn plan(
        &self,
        metadata: &EntityQueryMetadata,
        params: &QueryParameters,
    ) -> QueryResult<QueryPlan> {
        metadata.ensure_valid()?;
        QueryPlan::build(metadata, params)
    }

    /// Run one list query: validate, plan, fetch once, assemble the page.
    pub async fn execute(
        &self,
        metadata: &EntityQueryMetadata,
        params: &QueryParameters,
    ) -> QueryResult<ResultPage<S::Row>> {
        let plan = match self.plan(metadata, params) {
            Ok(plan) => plan,
            Err(e) => {
                if e.is_client_error() {
                    tracing::debug!(entity = %metadata.entity, error = %e, "rejected list query");
                }
                return Err(e);
            }
        };

        tracing::debug!(
            entity = %plan.entity,
            backend = self.store.backend(),
            page = plan.page,
            page_size = plan.page_size,
            joins = plan.joins.len(),
            distinct = plan.distinct,
            "executing list query"
        );

        let (items, total) = self.store.fetch_page(&plan).await?;
        Ok(ResultPage::new(items, total, plan.page, plan.page_size))
    }

    /// Run a list query for an entity type implementing the metadata contract.
    pub async fn execute_for<E: QueryableEntity>(
        &self,
        params: &QueryParameters,
    ) -> QueryResult<ResultPage<S::Row>> {
        let metadata = EntityQueryMetadata::of::<E>();
        self.execute(&metadata, params).await
    }
}
