//! Per-entity query metadata.
//!
//! An entity opts into the engine by describing which fields clients may
//! search, filter and sort on, the API aliases it accepts, which fields are
//! collections that need a join, and the semantic type of each field:
//! - `EntityQueryMetadata`: the static declaration, shared read-only
//! - `QueryableEntity`: the same contract as associated functions on a type
//! - `FieldRef`: a canonical path resolved to table alias, column and type

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{QueryError, QueryResult};

/// Semantic type of a filterable field, used to cast raw filter values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text; values pass through unchanged.
    #[default]
    Text,
    Boolean,
    /// 64-bit signed integer.
    Integer,
    /// Floating point / decimal number.
    Numeric,
    Uuid,
    /// Instant or offset date-time, compared in UTC.
    Timestamp,
    /// Enumeration with the declared constant names.
    Enumeration(Vec<String>),
}

impl FieldType {
    /// Whether ordering comparisons (`>`, `<=`, ...) make sense for this type.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Numeric | FieldType::Timestamp
        )
    }

    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Numeric => "numeric",
            FieldType::Uuid => "uuid",
            FieldType::Timestamp => "timestamp",
            FieldType::Enumeration(_) => "enumeration",
        }
    }
}

static TEXT_FIELD: FieldType = FieldType::Text;

/// Static descriptor for one field path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Semantic type used for value casting.
    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    /// Column name, when it differs from the path.
    #[serde(default)]
    pub column: Option<String>,
}

impl FieldDescriptor {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            column: None,
        }
    }

    /// Map the field onto an explicitly named column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// How a collection is reached from the base table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationJoin {
    /// `target.foreign_key = base.id`
    OneToMany { foreign_key: String },
    /// `link.join_key = base.id` and `target.target_key = link.inverse_key`
    ManyToMany {
        join_table: String,
        join_key: String,
        inverse_key: String,
    },
}

/// A collection-valued field and the relation backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRelation {
    /// Field name (may be dotted); also used as the join alias.
    pub name: String,

    /// Table holding the collection elements.
    pub table: String,

    /// Primary key of `table`, used by many-to-many joins.
    #[serde(default = "default_id_column")]
    pub target_key: String,

    pub join: RelationJoin,

    /// Column compared when the bare collection name is filtered on
    /// (collections of scalars such as tags).
    #[serde(default)]
    pub element_column: Option<String>,
}

impl CollectionRelation {
    /// A collection whose rows point back at the base row.
    pub fn one_to_many(
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            target_key: default_id_column(),
            join: RelationJoin::OneToMany {
                foreign_key: foreign_key.into(),
            },
            element_column: None,
        }
    }

    /// A collection reached through a link table.
    pub fn many_to_many(
        name: impl Into<String>,
        table: impl Into<String>,
        join_table: impl Into<String>,
        join_key: impl Into<String>,
        inverse_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            target_key: default_id_column(),
            join: RelationJoin::ManyToMany {
                join_table: join_table.into(),
                join_key: join_key.into(),
                inverse_key: inverse_key.into(),
            },
            element_column: None,
        }
    }

    pub fn with_target_key(mut self, target_key: impl Into<String>) -> Self {
        self.target_key = target_key.into();
        self
    }

    pub fn with_element_column(mut self, column: impl Into<String>) -> Self {
        self.element_column = Some(column.into());
        self
    }

    /// Alias of the link table for many-to-many joins.
    pub fn link_alias(&self) -> String {
        format!("{}__link", self.name)
    }
}

fn default_id_column() -> String {
    "id".to_string()
}

/// A field path resolved against the metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Canonical dotted path, as declared in the allow-lists.
    pub path: String,

    /// Collection the path goes through, if any.
    pub collection: Option<String>,

    /// Column on the base table or on the joined collection table.
    pub column: String,

    pub field_type: FieldType,
}

/// Query metadata for one entity type.
///
/// Static per entity; the engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityQueryMetadata {
    /// Entity name used in logs and errors.
    pub entity: String,

    /// Base table.
    pub table: String,

    /// Primary key column of the base table.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default)]
    pub search_fields: BTreeSet<String>,

    #[serde(default)]
    pub filter_fields: BTreeSet<String>,

    #[serde(default)]
    pub sort_fields: BTreeSet<String>,

    /// API name → canonical path.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    #[serde(default)]
    pub collections: Vec<CollectionRelation>,

    /// Canonical path → descriptor. Undeclared fields are text columns.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDescriptor>,
}

impl EntityQueryMetadata {
    /// Create empty metadata for a table.
    pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            id_column: default_id_column(),
            ..Default::default()
        }
    }

    /// Build the metadata from an entity's contract.
    pub fn of<E: QueryableEntity>() -> Self {
        let mut metadata = Self::new(E::entity_name(), E::table());
        metadata.id_column = E::id_column().to_string();
        metadata.search_fields = E::search_fields().iter().map(|f| f.to_string()).collect();
        metadata.filter_fields = E::filter_fields().iter().map(|f| f.to_string()).collect();
        metadata.sort_fields = E::sort_fields().iter().map(|f| f.to_string()).collect();
        metadata.aliases = E::field_aliases()
            .iter()
            .map(|(api, canonical)| (api.to_string(), canonical.to_string()))
            .collect();
        metadata.collections = E::collection_fields();
        metadata.fields = E::field_types()
            .into_iter()
            .map(|(path, descriptor)| (path.to_string(), descriptor))
            .collect();
        metadata
    }

    /// Parse metadata from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_filter_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_sort_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_alias(mut self, api_name: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(api_name.into(), canonical.into());
        self
    }

    pub fn with_collection(mut self, relation: CollectionRelation) -> Self {
        self.collections.push(relation);
        self
    }

    pub fn with_field(mut self, path: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(path.into(), descriptor);
        self
    }

    pub fn with_field_type(self, path: impl Into<String>, field_type: FieldType) -> Self {
        self.with_field(path, FieldDescriptor::new(field_type))
    }

    /// Substitute the canonical path for an API alias.
    pub fn resolve_alias<'a>(&'a self, field: &'a str) -> &'a str {
        self.aliases.get(field).map(String::as_str).unwrap_or(field)
    }

    /// Names of the collection-valued fields.
    pub fn collection_fields(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.name.as_str())
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionRelation> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Declared type of a canonical path (text when undeclared).
    pub fn field_type(&self, path: &str) -> &FieldType {
        self.fields
            .get(path)
            .map(|d| &d.field_type)
            .unwrap_or(&TEXT_FIELD)
    }

    /// The collection a path runs through: the longest declared collection
    /// name that equals the path or is one of its dot-prefixes.
    fn collection_for_path(&self, path: &str) -> Option<&CollectionRelation> {
        self.collections
            .iter()
            .filter(|c| {
                path == c.name
                    || path
                        .strip_prefix(c.name.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
            .max_by_key(|c| c.name.len())
    }

    /// Resolve a canonical path to the table alias, column and type it reads.
    ///
    /// Allow-list checks are the caller's job; this only fails when the
    /// metadata cannot express the path.
    pub fn resolve_field(&self, path: &str) -> QueryResult<FieldRef> {
        let descriptor = self.fields.get(path);
        let field_type = descriptor.map(|d| d.field_type.clone()).unwrap_or_default();
        let explicit_column = descriptor.and_then(|d| d.column.clone());

        let Some(relation) = self.collection_for_path(path) else {
            return Ok(FieldRef {
                path: path.to_string(),
                collection: None,
                column: explicit_column.unwrap_or_else(|| path.replace('.', "_")),
                field_type,
            });
        };

        let rest = path[relation.name.len()..].trim_start_matches('.');
        let column = if let Some(column) = explicit_column {
            column
        } else if rest.is_empty() {
            relation
                .element_column
                .clone()
                .ok_or_else(|| self.invalid(format!(
                    "collection '{}' has no element column to compare against",
                    relation.name
                )))?
        } else if rest.contains('.') {
            return Err(self.invalid(format!(
                "path '{path}' goes deeper than one collection hop"
            )));
        } else {
            rest.to_string()
        };

        Ok(FieldRef {
            path: path.to_string(),
            collection: Some(relation.name.clone()),
            column,
            field_type,
        })
    }

    fn invalid(&self, reason: String) -> QueryError {
        QueryError::InvalidMetadata {
            entity: self.entity.clone(),
            reason,
        }
    }

    /// Check the metadata for problems that would produce broken SQL.
    ///
    /// Returns a list of problems. Empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !is_safe_identifier(&self.table) {
            errors.push(format!("table '{}' is not a valid identifier", self.table));
        }
        if !is_safe_identifier(&self.id_column) {
            errors.push(format!(
                "id column '{}' is not a valid identifier",
                self.id_column
            ));
        }

        for relation in &self.collections {
            if !is_safe_identifier(&relation.name.replace('.', "_")) {
                errors.push(format!(
                    "collection name '{}' contains invalid characters",
                    relation.name
                ));
            }
            let mut identifiers = vec![&relation.table, &relation.target_key];
            match &relation.join {
                RelationJoin::OneToMany { foreign_key } => identifiers.push(foreign_key),
                RelationJoin::ManyToMany {
                    join_table,
                    join_key,
                    inverse_key,
                } => identifiers.extend([join_table, join_key, inverse_key]),
            }
            identifiers.extend(relation.element_column.as_ref());
            for identifier in identifiers {
                if !is_safe_identifier(identifier) {
                    errors.push(format!(
                        "collection '{}' references invalid identifier '{identifier}'",
                        relation.name
                    ));
                }
            }
        }

        let declared = self
            .search_fields
            .iter()
            .chain(&self.filter_fields)
            .chain(&self.sort_fields)
            .collect::<BTreeSet<_>>();
        for path in declared {
            match self.resolve_field(path) {
                Ok(field) if !is_safe_identifier(&field.column) => errors.push(format!(
                    "field '{path}' maps to invalid column '{}'",
                    field.column
                )),
                Ok(_) => {}
                Err(e) => errors.push(e.to_string()),
            }
        }

        for (path, descriptor) in &self.fields {
            if let FieldType::Enumeration(constants) = &descriptor.field_type
                && constants.is_empty()
            {
                errors.push(format!("enumeration field '{path}' declares no constants"));
            }
        }

        errors
    }

    /// [`validate`](Self::validate) as a `Result`, joining every problem.
    pub fn ensure_valid(&self) -> QueryResult<()> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(self.invalid(problems.join("; ")))
        }
    }
}

/// Validate a SQL identifier name (table/column names).
/// Allows only `[a-zA-Z_][a-zA-Z0-9_]*` with max 63 chars (PostgreSQL limit).
pub(crate) fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

/// The metadata contract an entity-owning module implements.
///
/// Every list is empty unless overridden; the engine reads the contract once
/// per query through [`EntityQueryMetadata::of`].
pub trait QueryableEntity {
    /// Entity name used in logs and errors.
    fn entity_name() -> &'static str;

    /// Base table.
    fn table() -> &'static str;

    fn id_column() -> &'static str {
        "id"
    }

    fn search_fields() -> &'static [&'static str] {
        &[]
    }

    fn filter_fields() -> &'static [&'static str] {
        &[]
    }

    fn sort_fields() -> &'static [&'static str] {
        &[]
    }

    /// `(api name, canonical path)` pairs.
    fn field_aliases() -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn collection_fields() -> Vec<CollectionRelation> {
        Vec::new()
    }

    fn field_types() -> Vec<(&'static str, FieldDescriptor)> {
        Vec::new()
    }
}
