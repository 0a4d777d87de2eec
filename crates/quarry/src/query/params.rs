//! Normalized list request parameters.

use serde::Deserialize;

use super::filter::FilterClause;
use crate::error::QueryResult;

/// First page number.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size when the request names none.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on page size.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Paging, sort, search and raw filters of one list request.
///
/// Construction never fails: out-of-range paging is clamped and blank
/// search terms are dropped. Filters stay raw until the predicate builder
/// validates them against the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameters {
    page: u32,
    page_size: u32,
    sort: Option<String>,
    search: Option<String>,
    filters: Vec<String>,
}

impl Default for QueryParameters {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort: None,
            search: None,
            filters: Vec::new(),
        }
    }
}

impl QueryParameters {
    pub fn new(
        page: Option<i64>,
        page_size: Option<i64>,
        sort: Option<&str>,
        search: Option<&str>,
        filters: Vec<String>,
    ) -> Self {
        let page = page
            .map(|p| p.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(DEFAULT_PAGE);

        let page_size = match page_size {
            None => DEFAULT_PAGE_SIZE,
            Some(size) if size > i64::from(MAX_PAGE_SIZE) => {
                tracing::warn!(
                    requested = size,
                    capped = MAX_PAGE_SIZE,
                    "page size exceeds maximum, capping"
                );
                MAX_PAGE_SIZE
            }
            Some(size) => size.max(1) as u32,
        };

        Self {
            page,
            page_size,
            sort: non_blank(sort),
            search: non_blank(search),
            filters,
        }
    }

    /// Build from decoded `(key, value)` pairs.
    ///
    /// Recognized keys: `page`, `pageSize` (or `page_size`), `sort`,
    /// `search` and repeatable `filter`. Repeated `sort` keys are joined;
    /// numbers that do not parse fall back to the defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut page = None;
        let mut page_size = None;
        let mut sort: Vec<String> = Vec::new();
        let mut search = None;
        let mut filters = Vec::new();

        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "page" => page = value.trim().parse::<i64>().ok(),
                "pageSize" | "page_size" => page_size = value.trim().parse::<i64>().ok(),
                "sort" => sort.push(value.to_string()),
                "search" => search = Some(value.to_string()),
                "filter" => filters.push(value.to_string()),
                _ => {}
            }
        }

        let sort = (!sort.is_empty()).then(|| sort.join(","));
        Self::new(page, page_size, sort.as_deref(), search.as_deref(), filters)
    }

    /// Parse a URL query string (with or without the leading `?`).
    ///
    /// A literal `+` decodes to a space, so timestamp offsets must be sent
    /// percent-encoded (`%2B`).
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    /// Replace the raw filter list.
    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// 1-based page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> Option<&str> {
        self.sort.as_deref()
    }

    /// Trimmed search term.
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Rows to skip before the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Parse every raw filter, failing on the first malformed one.
    pub fn filter_clauses(&self) -> QueryResult<Vec<FilterClause>> {
        self.filters.iter().map(|raw| FilterClause::parse(raw)).collect()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// List request as it arrives in a JSON body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    pub page: Option<i64>,
    #[serde(alias = "page_size")]
    pub page_size: Option<i64>,
    pub sort: Option<String>,
    pub search: Option<String>,
    #[serde(alias = "filters")]
    pub filter: Vec<String>,
}

impl From<ListRequest> for QueryParameters {
    fn from(request: ListRequest) -> Self {
        QueryParameters::new(
            request.page,
            request.page_size,
            request.sort.as_deref(),
            request.search.as_deref(),
            request.filter,
        )
    }
}
