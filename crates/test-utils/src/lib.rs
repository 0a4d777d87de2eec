//! Quarry test utilities.
//!
//! Fixtures for integration testing: a sample `Product` entity contract,
//! a product row builder and a small in-memory catalog.

use chrono::{DateTime, Utc};
use quarry::query::{CollectionRelation, FieldDescriptor, FieldType, QueryableEntity};
use quarry::{EntityQueryMetadata, MemoryStore};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Status constants of the sample entity.
pub const PRODUCT_STATUSES: [&str; 3] = ["ACTIVE", "DISCONTINUED", "DRAFT"];

/// Sample entity exercising every field type, aliases and both relation kinds.
pub struct Product;

impl QueryableEntity for Product {
    fn entity_name() -> &'static str {
        "product"
    }

    fn table() -> &'static str {
        "product"
    }

    fn search_fields() -> &'static [&'static str] {
        &["name", "description", "categories.name"]
    }

    fn filter_fields() -> &'static [&'static str] {
        &[
            "id",
            "sku",
            "name",
            "price",
            "quantity",
            "status",
            "in_stock",
            "created_at",
            "supplier.city",
            "categories.name",
            "tags",
        ]
    }

    fn sort_fields() -> &'static [&'static str] {
        &["name", "price", "quantity", "created_at", "categories.name"]
    }

    fn field_aliases() -> &'static [(&'static str, &'static str)] {
        &[
            ("createdAt", "created_at"),
            ("inStock", "in_stock"),
            ("category", "categories.name"),
            ("tag", "tags"),
            ("city", "supplier.city"),
        ]
    }

    fn collection_fields() -> Vec<CollectionRelation> {
        vec![
            CollectionRelation::many_to_many(
                "categories",
                "category",
                "product_category",
                "product_id",
                "category_id",
            ),
            CollectionRelation::one_to_many("tags", "product_tag", "product_id")
                .with_element_column("tag"),
        ]
    }

    fn field_types() -> Vec<(&'static str, FieldDescriptor)> {
        vec![
            ("id", FieldDescriptor::new(FieldType::Uuid)),
            ("sku", FieldDescriptor::new(FieldType::Uuid)),
            ("price", FieldDescriptor::new(FieldType::Numeric)),
            ("quantity", FieldDescriptor::new(FieldType::Integer)),
            (
                "status",
                FieldDescriptor::new(FieldType::Enumeration(
                    PRODUCT_STATUSES.iter().map(|s| s.to_string()).collect(),
                )),
            ),
            ("in_stock", FieldDescriptor::new(FieldType::Boolean)),
            ("created_at", FieldDescriptor::new(FieldType::Timestamp)),
        ]
    }
}

/// Metadata of the sample entity.
pub fn product_metadata() -> EntityQueryMetadata {
    EntityQueryMetadata::of::<Product>()
}

/// Create a test product with default values.
pub fn test_product(name: &str, price: f64) -> TestProduct {
    TestProduct {
        id: Uuid::now_v7(),
        sku: Uuid::now_v7(),
        name: name.to_string(),
        description: None,
        price: Some(price),
        quantity: 1,
        status: "ACTIVE".to_string(),
        in_stock: true,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        supplier_city: None,
        categories: Vec::new(),
        tags: Vec::new(),
    }
}

/// A product row builder.
#[derive(Debug, Clone)]
pub struct TestProduct {
    pub id: Uuid,
    pub sku: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub quantity: i64,
    pub status: String,
    pub in_stock: bool,
    pub created_at: DateTime<Utc>,
    pub supplier_city: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

impl TestProduct {
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_sku(mut self, sku: Uuid) -> Self {
        self.sku = sku;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Clear the price (stored as null).
    pub fn without_price(mut self) -> Self {
        self.price = None;
        self
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn out_of_stock(mut self) -> Self {
        self.in_stock = false;
        self
    }

    /// Set the creation time from an RFC 3339 string.
    ///
    /// # Panics
    /// Panics on an unparseable timestamp.
    #[allow(clippy::expect_used)]
    pub fn created(mut self, timestamp: &str) -> Self {
        self.created_at = DateTime::parse_from_rfc3339(timestamp)
            .expect("fixture timestamp must be RFC 3339")
            .with_timezone(&Utc);
        self
    }

    pub fn in_city(mut self, city: &str) -> Self {
        self.supplier_city = Some(city.to_string());
        self
    }

    pub fn in_categories(mut self, categories: &[&str]) -> Self {
        self.categories = categories.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Row as the in-memory store reads it: columns by name, collections as
    /// arrays.
    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "id": self.id,
            "sku": self.sku,
            "name": self.name,
            "description": self.description,
            "price": self.price,
            "quantity": self.quantity,
            "status": self.status,
            "in_stock": self.in_stock,
            "created_at": self.created_at.to_rfc3339(),
            "supplier_city": self.supplier_city,
            "categories": self
                .categories
                .iter()
                .map(|name| serde_json::json!({ "name": name }))
                .collect::<Vec<_>>(),
            "tags": self.tags,
        })
    }
}

/// Six products covering every field type and overlapping
/// categories and tags.
pub fn sample_products() -> Vec<TestProduct> {
    vec![
        test_product("Claw Hammer", 24.99)
            .with_description("Steel claw hammer with fiberglass handle")
            .with_quantity(12)
            .created("2024-01-05T09:00:00Z")
            .in_city("Portland")
            .in_categories(&["Tools", "Hardware"])
            .tagged(&["sale", "steel"]),
        test_product("Box of Nails", 4.5)
            .with_description("500 galvanized 2\" nails")
            .with_quantity(500)
            .created("2024-02-11T14:30:00Z")
            .in_city("Portland")
            .in_categories(&["Hardware"])
            .tagged(&["bulk"]),
        test_product("Garden Hose", 32.0)
            .with_description("50ft expandable hose")
            .with_quantity(0)
            .with_status("DISCONTINUED")
            .out_of_stock()
            .created("2023-11-20T08:15:00+02:00")
            .in_city("Austin")
            .in_categories(&["Garden"])
            .tagged(&["sale"]),
        test_product("Cordless Drill", 129.0)
            .with_description("18V drill, battery included")
            .with_quantity(3)
            .created("2024-03-02T17:45:00Z")
            .in_city("Denver")
            .in_categories(&["Tools", "Power Tools"]),
        test_product("Pruning Shears", 18.75)
            .with_description("Bypass shears for 100% clean cuts")
            .with_quantity(25)
            .with_status("DRAFT")
            .created("2024-03-15T10:00:00Z")
            .in_city("Austin")
            .in_categories(&["Garden", "Tools"])
            .tagged(&["steel", "sale"]),
        test_product("Workbench", 10.0)
            .with_quantity(1)
            .created("2024-01-20T12:00:00Z")
            .in_city("Denver"),
    ]
}

/// In-memory store holding [`sample_products`].
pub fn catalog_store() -> MemoryStore {
    MemoryStore::new(sample_products().iter().map(TestProduct::to_json).collect())
}

/// Names of JSON rows, in order.
pub fn names(rows: &[JsonValue]) -> Vec<&str> {
    rows.iter()
        .filter_map(|row| row.get("name").and_then(JsonValue::as_str))
        .collect()
}
