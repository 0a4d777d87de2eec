#![allow(clippy::unwrap_used, clippy::expect_used)]
//! SQL rendering tests for the sample product contract.

use quarry::store::SqlRenderer;
use quarry::{EntityQueryMetadata, QueryParameters, QueryPlan};
use quarry_test_utils::product_metadata;

fn render(query: &str) -> (String, String) {
    let plan = QueryPlan::build(
        &product_metadata(),
        &QueryParameters::from_query_string(query),
    )
    .unwrap();
    let renderer = SqlRenderer::new(&plan);
    (renderer.build_select(), renderer.build_count())
}

#[test]
fn unfiltered_request() {
    let (select, count) = render("");
    assert_eq!(
        select,
        "SELECT \"product\".* FROM \"product\" LIMIT 20 OFFSET 0"
    );
    assert_eq!(count, "SELECT COUNT(*) FROM \"product\"");
}

#[test]
fn embedded_path_maps_to_flattened_column() {
    let (select, _) = render("filter=city:eq:Austin");
    assert!(
        select.contains("\"product\".\"supplier_city\" = 'Austin'"),
        "{select}"
    );
}

#[test]
fn boolean_and_integer_values_are_typed() {
    let (select, _) = render("filter=inStock:eq:true&filter=quantity:gt:5");
    assert!(select.contains("\"product\".\"in_stock\" = TRUE"), "{select}");
    assert!(select.contains("\"product\".\"quantity\" > 5"), "{select}");
}

#[test]
fn each_collection_is_joined_once() {
    let (select, count) = render(
        "filter=category:eq:Tools&filter=categories.name:ne:Garden\
         &filter=tag:contains:sale&search=drill",
    );

    for sql in [&select, &count] {
        assert_eq!(
            sql.matches("LEFT JOIN \"product_category\"").count(),
            1,
            "{sql}"
        );
        assert_eq!(sql.matches("LEFT JOIN \"category\"").count(), 1, "{sql}");
        assert_eq!(sql.matches("LEFT JOIN \"product_tag\"").count(), 1, "{sql}");
        assert!(sql.contains("SELECT DISTINCT \"product\".\"id\""), "{sql}");
    }
}

#[test]
fn conditions_on_one_collection_use_the_same_join() {
    let (select, _) = render("filter=category:eq:Tools&filter=category:eq:Hardware");
    assert_eq!(select.matches("LEFT JOIN \"category\"").count(), 1, "{select}");
    assert!(
        select.contains(
            "\"categories\".\"name\" = 'Tools' AND \"categories\".\"name\" = 'Hardware'"
        ),
        "{select}"
    );
}

#[test]
fn collection_sort_never_reaches_sql() {
    let (select, _) = render("sort=categories.name:asc,createdAt:asc");
    assert!(
        select.contains("ORDER BY \"product\".\"created_at\" ASC"),
        "{select}"
    );
    assert!(!select.contains("\"categories\""), "{select}");
}

#[test]
fn sort_keeps_request_order() {
    let (select, _) = render("sort=name:asc,price");
    assert!(
        select.contains("ORDER BY \"product\".\"name\" ASC, \"product\".\"price\" DESC"),
        "{select}"
    );
}

#[test]
fn custom_id_column_is_used_for_joins() {
    let metadata = EntityQueryMetadata::new("order", "orders")
        .with_id_column("order_id")
        .with_filter_fields(["lines.sku"])
        .with_collection(quarry::query::CollectionRelation::one_to_many(
            "lines",
            "order_line",
            "order_id",
        ));
    let plan = QueryPlan::build(
        &metadata,
        &QueryParameters::default().with_filters(["lines.sku:eq:A-1"]),
    )
    .unwrap();
    let select = SqlRenderer::new(&plan).build_select();

    assert!(
        select.contains("\"orders\".\"order_id\" IN (SELECT DISTINCT \"orders\".\"order_id\""),
        "{select}"
    );
    assert!(
        select.contains(
            "LEFT JOIN \"order_line\" AS \"lines\" ON \"orders\".\"order_id\" = \"lines\".\"order_id\""
        ),
        "{select}"
    );
    assert!(select.contains("\"lines\".\"sku\" = 'A-1'"), "{select}");
}
