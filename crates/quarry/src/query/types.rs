//! Result page type.

use serde::{Deserialize, Serialize};

/// One page of a list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage<T> {
    pub items: Vec<T>,

    /// 1-based page number, as requested.
    pub page: u32,

    pub page_size: u32,
    pub total_pages: u32,
    pub total_elements: u64,
}

impl<T> ResultPage<T> {
    /// Create a page with paging calculations.
    pub fn new(items: Vec<T>, total_elements: u64, page: u32, page_size: u32) -> Self {
        let total_pages = if page_size > 0 {
            u32::try_from(total_elements.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
        } else {
            0
        };

        Self {
            items,
            page,
            page_size,
            total_pages,
            total_elements,
        }
    }

    /// Create an empty page.
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self::new(Vec::new(), 0, page, page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Convert the items, keeping the paging data.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ResultPage<U> {
        ResultPage {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            total_elements: self.total_elements,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn pagination() {
        let page = ResultPage::new(vec![1, 2, 3], 25, 1, 10);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());
        assert!(!page.has_prev());
    }

    #[test]
    fn last_page() {
        let page = ResultPage::new(vec![1; 5], 25, 3, 10);
        assert!(!page.has_next());
        assert!(page.has_prev());
    }

    #[test]
    fn exact_multiple() {
        let page = ResultPage::new(vec![0; 10], 20, 1, 10);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn empty_page() {
        let page: ResultPage<()> = ResultPage::empty(1, 20);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.total_elements, 0);
        assert!(!page.has_next());
    }

    #[test]
    fn page_past_the_end_echoes_request() {
        let page: ResultPage<()> = ResultPage::new(Vec::new(), 5, 9, 10);
        assert_eq!(page.page, 9);
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
    }

    #[test]
    fn serializes_camel_case() {
        let page = ResultPage::new(vec!["a"], 1, 1, 20);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "items": ["a"],
                "page": 1,
                "pageSize": 20,
                "totalPages": 1,
                "totalElements": 1
            })
        );
    }

    #[test]
    fn map_keeps_paging() {
        let page = ResultPage::new(vec![1, 2], 12, 2, 2).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total_pages, 6);
        assert_eq!(page.page, 2);
    }
}
