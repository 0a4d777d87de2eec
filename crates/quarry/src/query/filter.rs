//! Filter clauses and value casting.
//!
//! A raw filter has the form `field:operation:value`. Parsing only checks the
//! shape; the field is validated and the value cast once the entity's
//! metadata is known (see `predicate`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::metadata::FieldType;
use crate::error::{QueryError, QueryResult};

/// Filter operations accepted in `field:operation:value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperation {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Case-insensitive substring match.
    Like,
    /// Substring match on text, element membership on collections.
    Contains,
    /// Equals any of a comma-separated list.
    In,
}

impl FilterOperation {
    pub const ALL: [FilterOperation; 9] = [
        FilterOperation::Equals,
        FilterOperation::NotEquals,
        FilterOperation::GreaterThan,
        FilterOperation::GreaterOrEqual,
        FilterOperation::LessThan,
        FilterOperation::LessOrEqual,
        FilterOperation::Like,
        FilterOperation::Contains,
        FilterOperation::In,
    ];

    /// Canonical token.
    pub fn name(self) -> &'static str {
        match self {
            FilterOperation::Equals => "EQUALS",
            FilterOperation::NotEquals => "NOT_EQUALS",
            FilterOperation::GreaterThan => "GREATER_THAN",
            FilterOperation::GreaterOrEqual => "GREATER_OR_EQUAL",
            FilterOperation::LessThan => "LESS_THAN",
            FilterOperation::LessOrEqual => "LESS_OR_EQUAL",
            FilterOperation::Like => "LIKE",
            FilterOperation::Contains => "CONTAINS",
            FilterOperation::In => "IN",
        }
    }

    /// Parse an operation token, case-insensitively.
    ///
    /// Accepts the canonical names and the short forms (`eq`, `gte`, ...).
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token.trim().to_ascii_lowercase().as_str() {
            "equals" | "eq" => FilterOperation::Equals,
            "not_equals" | "ne" | "neq" => FilterOperation::NotEquals,
            "greater_than" | "gt" => FilterOperation::GreaterThan,
            "greater_or_equal" | "gte" | "ge" => FilterOperation::GreaterOrEqual,
            "less_than" | "lt" => FilterOperation::LessThan,
            "less_or_equal" | "lte" | "le" => FilterOperation::LessOrEqual,
            "like" => FilterOperation::Like,
            "contains" => FilterOperation::Contains,
            "in" => FilterOperation::In,
            _ => return None,
        };
        Some(op)
    }

    /// Ordering operators need an orderable field type.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            FilterOperation::GreaterThan
                | FilterOperation::GreaterOrEqual
                | FilterOperation::LessThan
                | FilterOperation::LessOrEqual
        )
    }

    /// Whether the value is a comma-separated list.
    pub fn takes_list(self) -> bool {
        self == FilterOperation::In
    }
}

impl fmt::Display for FilterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One parsed `field:operation:value` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    /// API-facing field name (may be an alias or a dotted path).
    pub field: String,
    pub operation: FilterOperation,
    /// Raw, uncast value.
    pub raw_value: String,
}

impl FilterClause {
    /// Parse a raw filter string.
    ///
    /// Splits on the first two colons only, so the value may itself contain
    /// colons (timestamps, URNs).
    pub fn parse(raw: &str) -> QueryResult<Self> {
        let malformed = |reason: &str| QueryError::MalformedFilter {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = raw.splitn(3, ':');
        let (Some(field), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed("expected field:operation:value"));
        };

        let field = field.trim();
        if field.is_empty() {
            return Err(malformed("field name is empty"));
        }

        let operation = FilterOperation::from_token(op)
            .ok_or_else(|| malformed(&format!("unknown operation '{}'", op.trim())))?;

        Ok(Self {
            field: field.to_string(),
            operation,
            raw_value: value.to_string(),
        })
    }

    /// Elements of an `IN` list: split on commas, trimmed, empties dropped.
    pub fn list_values(&self) -> Vec<&str> {
        self.raw_value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }
}

/// A filter value cast to its field's semantic type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Boolean(bool),
    Integer(i64),
    Numeric(f64),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    /// Enumeration constant name.
    Enum(String),
}

impl FilterValue {
    /// Cast a raw value to `field_type`.
    ///
    /// `field` is only used to build the error.
    pub fn cast(field: &str, field_type: &FieldType, raw: &str) -> QueryResult<Self> {
        let value = match field_type {
            FieldType::Text => FilterValue::Text(raw.to_string()),
            FieldType::Boolean => {
                if raw.eq_ignore_ascii_case("true") {
                    FilterValue::Boolean(true)
                } else if raw.eq_ignore_ascii_case("false") {
                    FilterValue::Boolean(false)
                } else {
                    return Err(QueryError::invalid_value(
                        field,
                        raw,
                        "expected true or false",
                    ));
                }
            }
            FieldType::Integer => raw
                .parse::<i64>()
                .map(FilterValue::Integer)
                .map_err(|_| QueryError::invalid_value(field, raw, "expected an integer"))?,
            FieldType::Numeric => match raw.parse::<f64>() {
                Ok(n) if n.is_finite() => FilterValue::Numeric(n),
                _ => return Err(QueryError::invalid_value(field, raw, "expected a number")),
            },
            FieldType::Uuid => {
                // Only the hyphenated 8-4-4-4-12 form; braced, URN and simple forms are rejected
                if raw.len() != 36 {
                    return Err(QueryError::invalid_value(field, raw, "expected a UUID"));
                }
                Uuid::try_parse(raw)
                    .map(FilterValue::Uuid)
                    .map_err(|_| QueryError::invalid_value(field, raw, "expected a UUID"))?
            }
            FieldType::Timestamp => DateTime::parse_from_rfc3339(raw)
                .map(|ts| FilterValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| {
                    QueryError::invalid_value(field, raw, "expected an ISO-8601 timestamp")
                })?,
            FieldType::Enumeration(constants) => {
                if constants.iter().any(|c| c == raw) {
                    FilterValue::Enum(raw.to_string())
                } else {
                    return Err(QueryError::invalid_value(
                        field,
                        raw,
                        format!("expected one of {}", constants.join(", ")),
                    ));
                }
            }
        };
        Ok(value)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) | FilterValue::Enum(s) => f.write_str(s),
            FilterValue::Boolean(b) => write!(f, "{b}"),
            FilterValue::Integer(i) => write!(f, "{i}"),
            FilterValue::Numeric(n) => write!(f, "{n}"),
            FilterValue::Uuid(u) => write!(f, "{u}"),
            FilterValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}
