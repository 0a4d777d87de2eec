//! In-memory store over JSON rows.
//!
//! Rows are JSON objects keyed by column name. A collection is an array under
//! the collection's name whose elements are objects (keyed by column) or bare
//! scalars (read through the relation's element column).
//!
//! Each joined collection binds one element at a time, mirroring the single
//! LEFT JOIN per collection in SQL: a row matches when some binding of
//! elements satisfies the whole predicate, so two conditions on the same
//! collection must hold for the same element. An empty collection binds
//! nothing and its conditions never hold.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::QueryStore;
use crate::error::QueryResult;
use crate::query::{FieldRef, FilterValue, Predicate, QueryPlan, SortDirection};

/// Store holding its rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Vec<Value>,
}

impl MemoryStore {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn push(&mut self, row: Value) {
        self.rows.push(row);
    }

    /// Rows matching the plan's predicate, sorted, before paging.
    pub fn matching(&self, plan: &QueryPlan) -> Vec<&Value> {
        let mut matched: Vec<&Value> = self
            .rows
            .iter()
            .filter(|row| {
                plan.predicate.as_ref().is_none_or(|predicate| {
                    bindings(row, plan)
                        .iter()
                        .any(|binding| evaluate(predicate, row, binding))
                })
            })
            .collect();

        if !plan.sort.is_empty() {
            matched.sort_by(|a, b| {
                plan.sort
                    .iter()
                    .map(|order| {
                        let ordering = compare_for_sort(
                            scalar_value(a, &order.field),
                            scalar_value(b, &order.field),
                        );
                        match order.direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        matched
    }
}

#[async_trait]
impl QueryStore for MemoryStore {
    type Row = Value;

    async fn fetch_page(&self, plan: &QueryPlan) -> QueryResult<(Vec<Value>, u64)> {
        let matched = self.matching(plan);
        let total = matched.len() as u64;

        let offset = usize::try_from(plan.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(plan.limit).unwrap_or(usize::MAX);
        let items = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect::<Vec<_>>();

        tracing::debug!(
            entity = %plan.entity,
            total,
            returned = items.len(),
            "evaluated list query in memory"
        );
        Ok((items, total))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Collection elements bound for one joined row, by collection name.
type Binding<'r> = HashMap<&'r str, &'r Value>;

/// Every combination of collection elements the plan's joins produce for a
/// row. Empty collections leave their name unbound.
fn bindings<'r>(row: &'r Value, plan: &'r QueryPlan) -> Vec<Binding<'r>> {
    let mut bindings = vec![Binding::new()];
    for relation in &plan.joins {
        let Some(Value::Array(elements)) = lookup(row, &relation.name) else {
            continue;
        };
        if elements.is_empty() {
            continue;
        }
        let name = relation.name.as_str();
        bindings = bindings
            .iter()
            .flat_map(move |binding| {
                elements.iter().map(move |element| {
                    let mut next = binding.clone();
                    next.insert(name, element);
                    next
                })
            })
            .collect();
    }
    bindings
}

fn evaluate(predicate: &Predicate, row: &Value, binding: &Binding<'_>) -> bool {
    match predicate {
        Predicate::All(children) => children.iter().all(|p| evaluate(p, row, binding)),
        Predicate::Any(children) => children.iter().any(|p| evaluate(p, row, binding)),
        Predicate::Equals {
            field,
            value,
            negated,
        } => field_value(row, binding, field)
            .and_then(|v| compare_to(v, value))
            .is_some_and(|ordering| ordering.is_eq() != *negated),
        Predicate::Compare { field, op, value } => field_value(row, binding, field)
            .and_then(|v| compare_to(v, value))
            .is_some_and(|ordering| op.accepts(ordering)),
        Predicate::Matches { field, needle } => field_value(row, binding, field)
            .and_then(text_of)
            .is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase())),
        Predicate::AnyOf { field, values } => {
            field_value(row, binding, field).is_some_and(|v| {
                values
                    .iter()
                    .any(|value| compare_to(v, value).is_some_and(Ordering::is_eq))
            })
        }
    }
}

/// Non-null value of a field under a binding: the scalar column, or the
/// bound collection element's column.
fn field_value<'r>(row: &'r Value, binding: &Binding<'r>, field: &FieldRef) -> Option<&'r Value> {
    let Some(collection) = &field.collection else {
        return scalar_value(row, field);
    };

    let element: &'r Value = *binding.get(collection.as_str())?;
    let value = match element {
        Value::Object(object) => object.get(&field.column)?,
        scalar => scalar,
    };
    (!value.is_null()).then_some(value)
}

/// Scalar column value; falls back to walking the dotted path.
fn scalar_value<'r>(row: &'r Value, field: &FieldRef) -> Option<&'r Value> {
    row.get(&field.column)
        .or_else(|| lookup(row, &field.path))
        .filter(|v| !v.is_null())
}

fn lookup<'r>(row: &'r Value, path: &str) -> Option<&'r Value> {
    row.get(path)
        .or_else(|| path.split('.').try_fold(row, |current, part| current.get(part)))
}

/// Compare a stored JSON value with a cast filter value.
///
/// `None` when the stored value has the wrong shape for the filter type.
fn compare_to(stored: &Value, value: &FilterValue) -> Option<Ordering> {
    match value {
        FilterValue::Text(s) | FilterValue::Enum(s) => Some(stored.as_str()?.cmp(s.as_str())),
        FilterValue::Boolean(b) => Some(stored.as_bool()?.cmp(b)),
        FilterValue::Integer(i) => match stored.as_i64() {
            Some(n) => Some(n.cmp(i)),
            None => stored.as_f64()?.partial_cmp(&(*i as f64)),
        },
        FilterValue::Numeric(n) => stored.as_f64()?.partial_cmp(n),
        FilterValue::Uuid(u) => Some(Uuid::try_parse(stored.as_str()?).ok()?.cmp(u)),
        FilterValue::Timestamp(ts) => {
            let stored = DateTime::parse_from_rfc3339(stored.as_str()?).ok()?;
            Some(stored.with_timezone(&Utc).cmp(ts))
        }
    }
}

/// Text rendering used by substring matches.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Ascending order with missing values last, as PostgreSQL sorts NULLs.
fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            },
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => text_of(a).cmp(&text_of(b)),
        },
    }
}
