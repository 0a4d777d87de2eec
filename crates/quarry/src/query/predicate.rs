//! Predicate tree construction.
//!
//! Lowers filter clauses and the search term into a store-agnostic predicate
//! tree. Every field is alias-resolved and checked against the entity's
//! allow-lists, values are cast to the field's declared type, and collection
//! paths register a join on their relation exactly once per builder.

use super::filter::{FilterClause, FilterOperation, FilterValue};
use super::metadata::{EntityQueryMetadata, FieldRef, FieldType};
use crate::error::{QueryError, QueryResult};

/// Ordering comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl Comparison {
    /// Whether `ordering` (field value compared to the filter value) satisfies
    /// the comparison.
    pub fn accepts(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Comparison::GreaterThan => ordering == Greater,
            Comparison::GreaterOrEqual => matches!(ordering, Greater | Equal),
            Comparison::LessThan => ordering == Less,
            Comparison::LessOrEqual => matches!(ordering, Less | Equal),
        }
    }
}

/// A node of the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact match, or mismatch when `negated`.
    Equals {
        field: FieldRef,
        value: FilterValue,
        negated: bool,
    },
    Compare {
        field: FieldRef,
        op: Comparison,
        value: FilterValue,
    },
    /// Case-insensitive substring match. `needle` is the raw, unescaped text.
    Matches { field: FieldRef, needle: String },
    /// Field equals any of the values.
    AnyOf {
        field: FieldRef,
        values: Vec<FilterValue>,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction of `predicates`; a single predicate is returned as is.
    pub fn all(mut predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::All(predicates)),
        }
    }

    /// Disjunction of `predicates`; a single predicate is returned as is.
    pub fn any(mut predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::Any(predicates)),
        }
    }
}

/// Result of [`PredicateBuilder::build`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuiltPredicate {
    /// `None` when there is nothing to filter on.
    pub predicate: Option<Predicate>,

    /// Collections to join, each once, in first-use order.
    pub joins: Vec<String>,
}

impl BuiltPredicate {
    /// A collection join fans out base rows, so the result must be distinct.
    pub fn requires_distinct(&self) -> bool {
        !self.joins.is_empty()
    }
}

/// Builds the predicate tree for one request.
pub struct PredicateBuilder<'m> {
    metadata: &'m EntityQueryMetadata,
    filters: Vec<Predicate>,
    search: Option<Predicate>,
    joins: Vec<String>,
}

impl<'m> PredicateBuilder<'m> {
    pub fn new(metadata: &'m EntityQueryMetadata) -> Self {
        Self {
            metadata,
            filters: Vec::new(),
            search: None,
            joins: Vec::new(),
        }
    }

    /// Parse and add a raw `field:operation:value` filter.
    pub fn filter_raw(&mut self, raw: &str) -> QueryResult<&mut Self> {
        let clause = FilterClause::parse(raw)?;
        self.filter(&clause)
    }

    /// Validate a parsed clause and add it to the conjunction.
    pub fn filter(&mut self, clause: &FilterClause) -> QueryResult<&mut Self> {
        let canonical = self.metadata.resolve_alias(&clause.field);
        if !self.metadata.filter_fields.contains(canonical) {
            return Err(QueryError::DisallowedField {
                field: clause.field.clone(),
            });
        }

        let field = self.metadata.resolve_field(canonical)?;
        let predicate = lower_clause(clause, field)?;
        self.register_joins(&predicate);
        self.filters.push(predicate);
        Ok(self)
    }

    /// Add the OR-group of substring matches over every search field.
    ///
    /// Blank terms and entities without search fields add nothing.
    pub fn search(&mut self, term: &str) -> QueryResult<&mut Self> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(self);
        }

        let mut matches = Vec::with_capacity(self.metadata.search_fields.len());
        for path in &self.metadata.search_fields {
            let field = self.metadata.resolve_field(path)?;
            matches.push(Predicate::Matches {
                field,
                needle: term.to_string(),
            });
        }

        if let Some(group) = Predicate::any(matches) {
            self.register_joins(&group);
            self.search = Some(group);
        }
        Ok(self)
    }

    /// Finish: filters AND-combined, then the search group.
    pub fn build(self) -> BuiltPredicate {
        let mut parts = self.filters;
        parts.extend(self.search);
        BuiltPredicate {
            predicate: Predicate::all(parts),
            joins: self.joins,
        }
    }

    fn register_joins(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::All(children) | Predicate::Any(children) => {
                for child in children {
                    self.register_joins(child);
                }
            }
            Predicate::Equals { field, .. }
            | Predicate::Compare { field, .. }
            | Predicate::Matches { field, .. }
            | Predicate::AnyOf { field, .. } => {
                if let Some(collection) = &field.collection
                    && !self.joins.contains(collection)
                {
                    self.joins.push(collection.clone());
                }
            }
        }
    }
}

fn lower_clause(clause: &FilterClause, field: FieldRef) -> QueryResult<Predicate> {
    let operation = clause.operation;
    let unsupported = |field: &FieldRef| QueryError::UnsupportedOperation {
        field: clause.field.clone(),
        operation: operation.name(),
        field_type: field.field_type.name(),
    };

    let compare = |field: FieldRef, op: Comparison| -> QueryResult<Predicate> {
        if !field.field_type.is_orderable() {
            return Err(unsupported(&field));
        }
        let value = FilterValue::cast(&clause.field, &field.field_type, &clause.raw_value)?;
        Ok(Predicate::Compare { field, op, value })
    };

    let predicate = match operation {
        FilterOperation::GreaterThan => compare(field, Comparison::GreaterThan)?,
        FilterOperation::GreaterOrEqual => compare(field, Comparison::GreaterOrEqual)?,
        FilterOperation::LessThan => compare(field, Comparison::LessThan)?,
        FilterOperation::LessOrEqual => compare(field, Comparison::LessOrEqual)?,
        FilterOperation::Equals | FilterOperation::NotEquals => {
            let value = FilterValue::cast(&clause.field, &field.field_type, &clause.raw_value)?;
            Predicate::Equals {
                field,
                value,
                negated: operation == FilterOperation::NotEquals,
            }
        }
        // On a collection path CONTAINS means "has an element equal to"
        FilterOperation::Contains if field.collection.is_some() => {
            let value = FilterValue::cast(&clause.field, &field.field_type, &clause.raw_value)?;
            Predicate::Equals {
                field,
                value,
                negated: false,
            }
        }
        FilterOperation::Like | FilterOperation::Contains => {
            if field.field_type != FieldType::Text {
                return Err(unsupported(&field));
            }
            Predicate::Matches {
                field,
                needle: clause.raw_value.clone(),
            }
        }
        FilterOperation::In => {
            let raw_values = clause.list_values();
            if raw_values.is_empty() {
                return Err(QueryError::invalid_value(
                    &clause.field,
                    &clause.raw_value,
                    "IN needs at least one value",
                ));
            }
            let values = raw_values
                .into_iter()
                .map(|raw| FilterValue::cast(&clause.field, &field.field_type, raw))
                .collect::<QueryResult<Vec<_>>>()?;
            Predicate::AnyOf { field, values }
        }
    };
    Ok(predicate)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::metadata::CollectionRelation;

    fn catalog() -> EntityQueryMetadata {
        EntityQueryMetadata::new("product", "product")
            .with_search_fields(["name", "sku"])
            .with_filter_fields([
                "name",
                "price",
                "status",
                "in_stock",
                "categories.name",
                "tags",
            ])
            .with_alias("category", "categories.name")
            .with_field_type("price", FieldType::Numeric)
            .with_field_type("in_stock", FieldType::Boolean)
            .with_field_type(
                "status",
                FieldType::Enumeration(vec!["ACTIVE".into(), "RETIRED".into()]),
            )
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

    fn build(metadata: &EntityQueryMetadata, filters: &[&str]) -> QueryResult<BuiltPredicate> {
        let mut builder = PredicateBuilder::new(metadata);
        for raw in filters {
            builder.filter_raw(raw)?;
        }
        Ok(builder.build())
    }

    #[test]
    fn single_filter_is_not_wrapped() {
        let built = build(&catalog(), &["price:gte:10"]).unwrap();
        assert!(!built.requires_distinct());
        let Some(Predicate::Compare { field, op, value }) = built.predicate else {
            panic!("expected a comparison, got {:?}", built.predicate);
        };
        assert_eq!(field.column, "price");
        assert_eq!(op, Comparison::GreaterOrEqual);
        assert_eq!(value, FilterValue::Numeric(10.0));
    }

    #[test]
    fn filters_are_and_combined_in_order() {
        let built = build(&catalog(), &["price:gt:1", "in_stock:eq:true"]).unwrap();
        let Some(Predicate::All(parts)) = built.predicate else {
            panic!("expected a conjunction");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], Predicate::Compare { .. }));
        assert!(matches!(
            parts[1],
            Predicate::Equals {
                value: FilterValue::Boolean(true),
                negated: false,
                ..
            }
        ));
    }

    #[test]
    fn no_filters_no_predicate() {
        let built = build(&catalog(), &[]).unwrap();
        assert_eq!(built.predicate, None);
        assert!(built.joins.is_empty());
    }

    #[test]
    fn disallowed_field_reports_request_name() {
        let err = build(&catalog(), &["bogusfield:eq:1"]).unwrap_err();
        let QueryError::DisallowedField { field } = err else {
            panic!("expected DisallowedField, got {err:?}");
        };
        assert_eq!(field, "bogusfield");
    }

    #[test]
    fn alias_resolves_before_allow_list_check() {
        let built = build(&catalog(), &["category:eq:Tools"]).unwrap();
        assert_eq!(built.joins, vec!["categories".to_string()]);
        let Some(Predicate::Equals { field, .. }) = built.predicate else {
            panic!("expected equality");
        };
        assert_eq!(field.path, "categories.name");
        assert_eq!(field.column, "name");
    }

    #[test]
    fn repeated_collection_joins_once() {
        let built = build(
            &catalog(),
            &["category:eq:Tools", "categories.name:ne:Garden", "tags:contains:sale"],
        )
        .unwrap();
        assert_eq!(
            built.joins,
            vec!["categories".to_string(), "tags".to_string()]
        );
        assert!(built.requires_distinct());
    }

    #[test]
    fn ordering_requires_orderable_type() {
        let err = build(&catalog(), &["name:gt:a"]).unwrap_err();
        assert!(
            matches!(
                err,
                QueryError::UnsupportedOperation {
                    operation: "GREATER_THAN",
                    field_type: "text",
                    ..
                }
            ),
            "{err:?}"
        );
        assert!(build(&catalog(), &["in_stock:lte:true"]).is_err());
    }

    #[test]
    fn like_requires_text() {
        let err = build(&catalog(), &["price:like:1"]).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperation { .. }));

        let built = build(&catalog(), &["name:like:wid"]).unwrap();
        assert!(matches!(built.predicate, Some(Predicate::Matches { .. })));
    }

    #[test]
    fn contains_on_collection_is_membership() {
        let built = build(&catalog(), &["tags:contains:sale"]).unwrap();
        let Some(Predicate::Equals { field, value, negated }) = built.predicate else {
            panic!("expected equality");
        };
        assert_eq!(field.collection.as_deref(), Some("tags"));
        assert_eq!(field.column, "tag");
        assert_eq!(value, FilterValue::Text("sale".to_string()));
        assert!(!negated);
    }

    #[test]
    fn contains_on_text_is_substring() {
        let built = build(&catalog(), &["name:contains:50%"]).unwrap();
        assert_eq!(
            built.predicate,
            Some(Predicate::Matches {
                field: catalog().resolve_field("name").unwrap(),
                needle: "50%".to_string(),
            })
        );
    }

    #[test]
    fn in_casts_every_element() {
        let built = build(&catalog(), &["status:in:ACTIVE, RETIRED"]).unwrap();
        let Some(Predicate::AnyOf { values, .. }) = built.predicate else {
            panic!("expected membership");
        };
        assert_eq!(
            values,
            vec![
                FilterValue::Enum("ACTIVE".to_string()),
                FilterValue::Enum("RETIRED".to_string())
            ]
        );

        let err = build(&catalog(), &["status:in:ACTIVE,archived"]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { .. }));
    }

    #[test]
    fn empty_in_list_is_invalid() {
        let err = build(&catalog(), &["status:in: , "]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { .. }), "{err:?}");
    }

    #[test]
    fn cast_failure_surfaces_invalid_value() {
        let err = build(&catalog(), &["price:eq:abc"]).unwrap_err();
        let QueryError::InvalidValue { field, value, .. } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(field, "price");
        assert_eq!(value, "abc");
    }

    #[test]
    fn first_invalid_filter_wins() {
        let err = build(&catalog(), &["price", "bogus:eq:1"]).unwrap_err();
        assert!(matches!(err, QueryError::MalformedFilter { .. }));
    }

    #[test]
    fn search_ors_every_search_field() {
        let metadata = catalog();
        let mut builder = PredicateBuilder::new(&metadata);
        builder.search("  widget ").unwrap();
        let built = builder.build();
        let Some(Predicate::Any(matches)) = built.predicate else {
            panic!("expected a disjunction");
        };
        assert_eq!(matches.len(), 2);
        for m in matches {
            let Predicate::Matches { needle, .. } = m else {
                panic!("expected a substring match");
            };
            assert_eq!(needle, "widget");
        }
    }

    #[test]
    fn search_is_anded_with_filters() {
        let metadata = catalog();
        let mut builder = PredicateBuilder::new(&metadata);
        builder.filter_raw("price:lt:100").unwrap().search("widget").unwrap();
        let Some(Predicate::All(parts)) = builder.build().predicate else {
            panic!("expected a conjunction");
        };
        assert!(matches!(parts[0], Predicate::Compare { .. }));
        assert!(matches!(parts[1], Predicate::Any(_)));
    }

    #[test]
    fn search_without_search_fields_is_ignored() {
        let metadata = EntityQueryMetadata::new("note", "note");
        let mut builder = PredicateBuilder::new(&metadata);
        builder.search("anything").unwrap();
        assert_eq!(builder.build().predicate, None);
    }

    #[test]
    fn search_through_collection_registers_join() {
        let metadata = catalog().with_search_fields(["categories.name"]);
        let mut builder = PredicateBuilder::new(&metadata);
        builder.filter_raw("category:eq:Tools").unwrap();
        builder.search("tool").unwrap();
        assert_eq!(builder.build().joins, vec!["categories".to_string()]);
    }
}
