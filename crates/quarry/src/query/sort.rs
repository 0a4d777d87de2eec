//! Sort specification resolution.

use serde::{Deserialize, Serialize};

use super::metadata::{EntityQueryMetadata, FieldRef};

/// Sort direction. Anything unrecognized sorts descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(token: &str) -> Self {
        if token.trim().eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }
}

/// One resolved ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: FieldRef,
    pub direction: SortDirection,
}

/// Resolve a `field:direction,field:direction` spec against the metadata.
///
/// Fields that are not sortable, or that run through a collection, are
/// dropped rather than rejected. Request order is kept.
pub fn resolve_sort(metadata: &EntityQueryMetadata, spec: Option<&str>) -> Vec<SortOrder> {
    let Some(spec) = spec else {
        return Vec::new();
    };

    let mut orders = Vec::new();
    for segment in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, direction) = match segment.split_once(':') {
            Some((name, direction)) => (name.trim(), SortDirection::parse(direction)),
            None => (segment, SortDirection::Desc),
        };

        let canonical = metadata.resolve_alias(name);
        if !metadata.sort_fields.contains(canonical) {
            tracing::debug!(
                entity = %metadata.entity,
                field = name,
                "dropping sort on non-sortable field"
            );
            continue;
        }

        match metadata.resolve_field(canonical) {
            Ok(field) if field.collection.is_none() => orders.push(SortOrder { field, direction }),
            Ok(_) => tracing::debug!(
                entity = %metadata.entity,
                field = name,
                "dropping sort on collection field"
            ),
            Err(e) => tracing::debug!(
                entity = %metadata.entity,
                field = name,
                error = %e,
                "dropping unresolvable sort field"
            ),
        }
    }
    orders
}
