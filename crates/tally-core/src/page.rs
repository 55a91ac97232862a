//! Pagination for list endpoints.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::validation::{validate_pagination, ValidationResult};

/// Validated `page`/`limit` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> ValidationResult<Self> {
        let (limit, offset) = validate_pagination(page, limit)?;
        Ok(PageRequest {
            page: offset / limit + 1,
            limit,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            limit: crate::DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results plus the totals needed to render a pager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Page {
            items,
            total,
            page: request.page,
            limit: request.limit,
            pages: (total + request.limit - 1) / request.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_rounds_up() {
        let request = PageRequest::new(Some(2), Some(10)).unwrap();
        assert_eq!(request.offset(), 10);

        let page = Page::new(vec![1, 2, 3], 23, request);
        assert_eq!(page.pages, 3);
        assert_eq!(Page::<i32>::new(vec![], 0, request).pages, 0);
    }

    #[test]
    fn test_rejects_oversized_pages() {
        assert!(PageRequest::new(None, Some(101)).is_err());
        assert!(PageRequest::new(Some(0), None).is_err());
        assert_eq!(PageRequest::new(None, None).unwrap(), PageRequest::default());
    }
}
