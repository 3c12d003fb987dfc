//! Common wire types shared by every resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paged list envelope returned by every list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: i32,
    pub page_size: i32,
}

impl<T> PagedResult<T> {
    pub fn empty(page: i32, page_size: i32) -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            page,
            page_size,
        }
    }

    pub fn total_pages(&self) -> i64 {
        if self.page_size <= 0 {
            return 0;
        }
        let size = self.page_size as i64;
        (self.total_count + size - 1) / size
    }

    pub fn has_next_page(&self) -> bool {
        (self.page as i64) < self.total_pages()
    }

    pub fn has_previous_page(&self) -> bool {
        self.page > 1
    }
}

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_result_navigation() {
        let page = PagedResult {
            items: vec![1, 2, 3],
            total_count: 120,
            page: 2,
            page_size: 50,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next_page());
        assert!(page.has_previous_page());

        let empty: PagedResult<i32> = PagedResult::empty(1, 50);
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next_page());
        assert!(!empty.has_previous_page());
    }

    #[test]
    fn test_paged_result_uses_camel_case() {
        let json = serde_json::json!({
            "items": ["a"],
            "totalCount": 1,
            "page": 1,
            "pageSize": 25
        });
        let page: PagedResult<String> = serde_json::from_value(json).unwrap();
        assert_eq!(page.page_size, 25);
        assert_eq!(page.items, vec!["a".to_string()]);
    }
}
