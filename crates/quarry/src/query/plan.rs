//! Store-agnostic query plans.

use super::metadata::{CollectionRelation, EntityQueryMetadata};
use super::params::QueryParameters;
use super::predicate::{Predicate, PredicateBuilder};
use super::sort::{SortOrder, resolve_sort};
use crate::error::QueryResult;

/// Everything a store needs to run one list query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub entity: String,
    pub table: String,
    pub id_column: String,

    /// Collection joins, each once.
    pub joins: Vec<CollectionRelation>,

    pub predicate: Option<Predicate>,
    pub sort: Vec<SortOrder>,

    /// Base rows must be de-duplicated (set whenever `joins` is non-empty).
    pub distinct: bool,

    pub page: u32,
    pub page_size: u32,
    pub offset: u64,
    pub limit: u64,
}

impl QueryPlan {
    /// Validate the request against the metadata and assemble the plan.
    ///
    /// Filters are checked in request order; the first invalid one fails the
    /// whole request.
    pub fn build(metadata: &EntityQueryMetadata, params: &QueryParameters) -> QueryResult<Self> {
        let mut builder = PredicateBuilder::new(metadata);
        for raw in params.filters() {
            builder.filter_raw(raw)?;
        }
        if let Some(term) = params.search() {
            builder.search(term)?;
        }
        let built = builder.build();
        let distinct = built.requires_distinct();

        let joins = built
            .joins
            .iter()
            .filter_map(|name| metadata.collection(name).cloned())
            .collect();

        Ok(Self {
            entity: metadata.entity.clone(),
            table: metadata.table.clone(),
            id_column: metadata.id_column.clone(),
            joins,
            predicate: built.predicate,
            sort: resolve_sort(metadata, params.sort()),
            distinct,
            page: params.page(),
            page_size: params.page_size(),
            offset: params.offset(),
            limit: u64::from(params.page_size()),
        })
    }

    /// Table alias a field is read from.
    pub fn source_alias<'a>(&'a self, collection: Option<&'a str>) -> &'a str {
        collection.unwrap_or(&self.table)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::metadata::FieldType;

    fn catalog() -> EntityQueryMetadata {
        EntityQueryMetadata::new("product", "product")
            .with_search_fields(["name"])
            .with_filter_fields(["price", "tags"])
            .with_sort_fields(["price"])
            .with_field_type("price", FieldType::Numeric)
            .with_collection(
                CollectionRelation::one_to_many("tags", "product_tag", "product_id")
                    .with_element_column("tag"),
            )
    }

    #[test]
    fn plan_carries_paging() {
        let params = QueryParameters::new(Some(3), Some(10), Some("price:asc"), None, Vec::new());
        let plan = QueryPlan::build(&catalog(), &params).unwrap();
        assert_eq!(plan.page, 3);
        assert_eq!(plan.offset, 20);
        assert_eq!(plan.limit, 10);
        assert_eq!(plan.sort.len(), 1);
        assert!(plan.predicate.is_none());
        assert!(!plan.distinct);
    }

    #[test]
    fn collection_filter_marks_distinct() {
        let params = QueryParameters::default().with_filters(["tags:eq:sale", "tags:ne:old"]);
        let plan = QueryPlan::build(&catalog(), &params).unwrap();
        assert!(plan.distinct);
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].table, "product_tag");
    }

    #[test]
    fn invalid_filter_fails_the_plan() {
        let params = QueryParameters::default().with_filters(["price:eq:abc"]);
        assert!(QueryPlan::build(&catalog(), &params).is_err());
    }

    #[test]
    fn source_alias_defaults_to_base_table() {
        let plan = QueryPlan::build(&catalog(), &QueryParameters::default()).unwrap();
        assert_eq!(plan.source_alias(None), "product");
        assert_eq!(plan.source_alias(Some("tags")), "tags");
    }
}
