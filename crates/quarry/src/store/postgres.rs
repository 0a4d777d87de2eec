//! PostgreSQL store.
//!
//! Plans are rendered with SeaQuery. Collection joins are LEFT JOINs aliased
//! by collection name; when a plan needs distinct rows the joins and
//! predicate move into an `id IN (SELECT DISTINCT ...)` subquery so the outer
//! query can select and order base rows without fan-out.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use sea_query::{
    Alias, Asterisk, Cond, Expr, Func, JoinType, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, Value,
};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::QueryStore;
use crate::config::Config;
use crate::error::QueryResult;
use crate::query::{
    Comparison, FieldRef, FieldType, FilterValue, Predicate, QueryPlan, RelationJoin,
    SortDirection,
};

/// Renders a [`QueryPlan`] to PostgreSQL.
pub struct SqlRenderer<'p> {
    plan: &'p QueryPlan,
}

impl<'p> SqlRenderer<'p> {
    pub fn new(plan: &'p QueryPlan) -> Self {
        Self { plan }
    }

    /// Build the page query: base rows, sorted, with LIMIT/OFFSET.
    pub fn build_select(&self) -> String {
        let base = Alias::new(&self.plan.table);
        let mut query = Query::select();
        query.column((base.clone(), Asterisk)).from(base.clone());

        if self.plan.distinct {
            query.and_where(
                Expr::col((base, Alias::new(&self.plan.id_column))).in_subquery(self.matching_ids()),
            );
        } else {
            self.add_predicate(&mut query);
        }

        self.add_sorts(&mut query);
        query.limit(self.plan.limit);
        query.offset(self.plan.offset);

        query.to_string(PostgresQueryBuilder)
    }

    /// Build a COUNT query over matching base rows.
    pub fn build_count(&self) -> String {
        let mut query = Query::select();
        query.expr(Expr::col(Asterisk).count());

        if self.plan.distinct {
            query.from_subquery(self.matching_ids(), Alias::new("matching"));
        } else {
            query.from(Alias::new(&self.plan.table));
            self.add_predicate(&mut query);
        }

        query.to_string(PostgresQueryBuilder)
    }

    /// `SELECT DISTINCT base.id` over the joins and predicate.
    fn matching_ids(&self) -> SelectStatement {
        let base = Alias::new(&self.plan.table);
        let mut query = Query::select();
        query
            .distinct()
            .column((base.clone(), Alias::new(&self.plan.id_column)))
            .from(base);
        self.add_joins(&mut query);
        self.add_predicate(&mut query);
        query
    }

    fn add_joins(&self, query: &mut SelectStatement) {
        let base_id = || {
            Expr::col((
                Alias::new(&self.plan.table),
                Alias::new(&self.plan.id_column),
            ))
        };

        for relation in &self.plan.joins {
            let alias = Alias::new(&relation.name);
            match &relation.join {
                RelationJoin::OneToMany { foreign_key } => {
                    query.join_as(
                        JoinType::LeftJoin,
                        Alias::new(&relation.table),
                        alias.clone(),
                        base_id().equals((alias, Alias::new(foreign_key))),
                    );
                }
                RelationJoin::ManyToMany {
                    join_table,
                    join_key,
                    inverse_key,
                } => {
                    let link = Alias::new(relation.link_alias());
                    query.join_as(
                        JoinType::LeftJoin,
                        Alias::new(join_table),
                        link.clone(),
                        base_id().equals((link.clone(), Alias::new(join_key))),
                    );
                    query.join_as(
                        JoinType::LeftJoin,
                        Alias::new(&relation.table),
                        alias.clone(),
                        Expr::col((link, Alias::new(inverse_key)))
                            .equals((alias, Alias::new(&relation.target_key))),
                    );
                }
            }
        }
    }

    fn add_predicate(&self, query: &mut SelectStatement) {
        if let Some(predicate) = &self.plan.predicate {
            query.and_where(self.predicate_expr(predicate));
        }
    }

    fn predicate_expr(&self, predicate: &Predicate) -> SimpleExpr {
        match predicate {
            Predicate::All(children) => children
                .iter()
                .fold(Cond::all(), |cond, child| cond.add(self.predicate_expr(child)))
                .into(),
            Predicate::Any(children) => children
                .iter()
                .fold(Cond::any(), |cond, child| cond.add(self.predicate_expr(child)))
                .into(),
            Predicate::Equals {
                field,
                value,
                negated,
            } => {
                let col = self.column(field);
                if *negated {
                    col.ne(sql_value(value))
                } else {
                    col.eq(sql_value(value))
                }
            }
            Predicate::Compare { field, op, value } => {
                let col = self.column(field);
                match op {
                    Comparison::GreaterThan => col.gt(sql_value(value)),
                    Comparison::GreaterOrEqual => col.gte(sql_value(value)),
                    Comparison::LessThan => col.lt(sql_value(value)),
                    Comparison::LessOrEqual => col.lte(sql_value(value)),
                }
            }
            Predicate::Matches { field, needle } => {
                let col = self.column(field);
                let text: SimpleExpr = if field.field_type == FieldType::Text {
                    col.into()
                } else {
                    col.cast_as(Alias::new("text"))
                };
                let pattern = format!("%{}%", escape_like_wildcards(&needle.to_lowercase()));
                Expr::expr(Func::lower(text)).like(pattern)
            }
            Predicate::AnyOf { field, values } => {
                self.column(field).is_in(values.iter().map(sql_value))
            }
        }
    }

    fn add_sorts(&self, query: &mut SelectStatement) {
        for sort in &self.plan.sort {
            let order = match sort.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            query.order_by(
                (
                    Alias::new(self.plan.source_alias(sort.field.collection.as_deref())),
                    Alias::new(&sort.field.column),
                ),
                order,
            );
        }
    }

    fn column(&self, field: &FieldRef) -> Expr {
        Expr::col((
            Alias::new(self.plan.source_alias(field.collection.as_deref())),
            Alias::new(&field.column),
        ))
    }
}

fn sql_value(value: &FilterValue) -> Value {
    match value {
        FilterValue::Text(s) | FilterValue::Enum(s) => s.clone().into(),
        FilterValue::Boolean(b) => (*b).into(),
        FilterValue::Integer(i) => (*i).into(),
        FilterValue::Numeric(n) => (*n).into(),
        FilterValue::Uuid(u) => (*u).into(),
        FilterValue::Timestamp(ts) => (*ts).into(),
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Begin a transaction so `SET LOCAL` covers both queries and they share a
/// snapshot.
async fn begin(
    pool: &PgPool,
    statement_timeout: Option<Duration>,
) -> QueryResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await?;
    if let Some(timeout) = statement_timeout {
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
    }
    Ok(tx)
}

async fn count(tx: &mut Transaction<'static, Postgres>, sql: &str) -> QueryResult<u64> {
    let total: i64 = sqlx::query_scalar(sql).fetch_one(&mut **tx).await?;
    Ok(u64::try_from(total).unwrap_or(0))
}

/// Store that maps rows onto `T` with [`FromRow`].
pub struct PgStore<T> {
    pool: PgPool,
    statement_timeout: Option<Duration>,
    _row: PhantomData<fn() -> T>,
}

impl<T> PgStore<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: None,
            _row: PhantomData,
        }
    }

    /// Use the pool and statement timeout from configuration.
    pub fn from_config(pool: PgPool, config: &Config) -> Self {
        Self::new(pool).with_statement_timeout(config.statement_timeout)
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl<T> QueryStore for PgStore<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    type Row = T;

    async fn fetch_page(&self, plan: &QueryPlan) -> QueryResult<(Vec<T>, u64)> {
        let renderer = SqlRenderer::new(plan);
        let count_sql = renderer.build_count();
        let select_sql = renderer.build_select();
        tracing::debug!(entity = %plan.entity, sql = %select_sql, "list query");

        let mut tx = begin(&self.pool, self.statement_timeout).await?;
        let total = count(&mut tx, &count_sql).await?;
        let rows = sqlx::query_as::<_, T>(&select_sql)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((rows, total))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Store that returns each row as a JSON object (`row_to_json`).
#[derive(Clone)]
pub struct PgJsonStore {
    pool: PgPool,
    statement_timeout: Option<Duration>,
}

impl PgJsonStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: None,
        }
    }

    /// Use the pool and statement timeout from configuration.
    pub fn from_config(pool: PgPool, config: &Config) -> Self {
        Self::new(pool).with_statement_timeout(config.statement_timeout)
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl QueryStore for PgJsonStore {
    type Row = serde_json::Value;

    async fn fetch_page(&self, plan: &QueryPlan) -> QueryResult<(Vec<serde_json::Value>, u64)> {
        let renderer = SqlRenderer::new(plan);
        let count_sql = renderer.build_count();
        let select_sql = renderer.build_select();
        tracing::debug!(entity = %plan.entity, sql = %select_sql, "list query");

        let mut tx = begin(&self.pool, self.statement_timeout).await?;
        let total = count(&mut tx, &count_sql).await?;
        let rows: Vec<serde_json::Value> =
            sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({select_sql}) t"))
                .fetch_all(&mut *tx)
                .await?;
        tx.commit().await?;

        Ok((rows, total))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::{CollectionRelation, EntityQueryMetadata, QueryParameters};

    fn catalog() -> EntityQueryMetadata {
        EntityQueryMetadata::new("product", "product")
            .with_search_fields(["name", "price"])
            .with_filter_fields(["name", "price", "status", "categories.name", "tags"])
            .with_sort_fields(["price", "name"])
            .with_alias("category", "categories.name")
            .with_field_type("price", FieldType::Numeric)
            .with_collection(CollectionRelation::many_to_many(
                "categories",
                "category",
                "product_category",
                "product_id",
                "category_id",
            ))
            .with_collection(
                CollectionRelation::one_to_many("tags", "product_tag", "product_id")
                    .with_element_column("tag"),
            )
    }

    fn plan(query: &str) -> QueryPlan {
        QueryPlan::build(&catalog(), &QueryParameters::from_query_string(query)).unwrap()
    }

    #[test]
    fn simple_select() {
        let plan = plan("sort=price:asc");
        let sql = SqlRenderer::new(&plan).build_select();

        assert!(sql.starts_with("SELECT \"product\".* FROM \"product\""), "{sql}");
        assert!(sql.contains("ORDER BY \"product\".\"price\" ASC"), "{sql}");
        assert!(sql.contains("LIMIT 20"), "{sql}");
        assert!(sql.contains("OFFSET 0"), "{sql}");
        assert!(!sql.contains("WHERE"), "{sql}");
    }

    #[test]
    fn pagination_offset() {
        let plan = plan("page=3&pageSize=15");
        let sql = SqlRenderer::new(&plan).build_select();
        assert!(sql.contains("LIMIT 15"), "{sql}");
        assert!(sql.contains("OFFSET 30"), "{sql}");
    }

    #[test]
    fn scalar_filters() {
        let plan = plan("filter=price:gte:10&filter=name:ne:Widget");
        let sql = SqlRenderer::new(&plan).build_select();

        assert!(sql.contains("\"product\".\"price\" >="), "{sql}");
        assert!(sql.contains("\"product\".\"name\" <> 'Widget'"), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
        assert!(!sql.contains("JOIN"), "{sql}");
    }

    #[test]
    fn count_query() {
        let plan = plan("filter=price:lt:5&page=2");
        let sql = SqlRenderer::new(&plan).build_count();

        assert!(sql.contains("COUNT(*)"), "{sql}");
        assert!(sql.contains("FROM \"product\""), "{sql}");
        assert!(sql.contains("\"product\".\"price\" <"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
        assert!(!sql.contains("ORDER BY"), "{sql}");
    }

    #[test]
    fn many_to_many_join_goes_through_link_table() {
        let plan = plan("filter=category:eq:Tools");
        let sql = SqlRenderer::new(&plan).build_select();

        assert!(
            sql.contains(
                "LEFT JOIN \"product_category\" AS \"categories__link\" \
                 ON \"product\".\"id\" = \"categories__link\".\"product_id\""
            ),
            "{sql}"
        );
        assert!(
            sql.contains(
                "LEFT JOIN \"category\" AS \"categories\" \
                 ON \"categories__link\".\"category_id\" = \"categories\".\"id\""
            ),
            "{sql}"
        );
        assert!(sql.contains("\"categories\".\"name\" = 'Tools'"), "{sql}");
    }

    #[test]
    fn collection_filter_uses_distinct_subquery() {
        let plan = plan("filter=tags:contains:sale&filter=tags:ne:old&sort=price:desc");
        let renderer = SqlRenderer::new(&plan);
        let sql = renderer.build_select();

        assert!(
            sql.contains("\"product\".\"id\" IN (SELECT DISTINCT \"product\".\"id\" FROM \"product\""),
            "{sql}"
        );
        assert_eq!(sql.matches("LEFT JOIN \"product_tag\"").count(), 1, "{sql}");
        assert!(sql.contains("\"tags\".\"tag\" = 'sale'"), "{sql}");
        assert!(sql.contains("ORDER BY \"product\".\"price\" DESC"), "{sql}");

        let count = renderer.build_count();
        assert!(count.contains("COUNT(*)"), "{count}");
        assert!(count.contains("SELECT DISTINCT \"product\".\"id\""), "{count}");
        assert!(count.contains("AS \"matching\""), "{count}");
    }

    #[test]
    fn search_is_case_insensitive_or_group() {
        let plan = plan("search=WiDget");
        let sql = SqlRenderer::new(&plan).build_select();

        assert!(sql.contains("LOWER(\"product\".\"name\") LIKE '%widget%'"), "{sql}");
        assert!(sql.contains("CAST("), "non-text search fields are cast: {sql}");
        assert!(sql.contains(" OR "), "{sql}");
    }

    #[test]
    fn in_filter() {
        let plan = plan("filter=name:in:a,b,c");
        let sql = SqlRenderer::new(&plan).build_select();
        assert!(sql.contains("\"product\".\"name\" IN ('a', 'b', 'c')"), "{sql}");
    }

    #[test]
    fn values_are_quoted() {
        let plan = plan("filter=name:eq:O'Brien");
        let sql = SqlRenderer::new(&plan).build_select();
        assert!(!sql.contains("'O'Brien'"), "{sql}");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like_wildcards("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like_wildcards("plain"), "plain");
    }
}
