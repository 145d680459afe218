//! Pagination helpers shared by listings

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        ((self.total as u64 + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Page navigation data for templates
    pub fn info(&self) -> PageInfo {
        PageInfo {
            page: self.page,
            total_pages: self.total_pages(),
            total: self.total,
            has_next: self.has_next(),
            has_prev: self.has_prev(),
        }
    }
}

/// Serializable page navigation state
#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub total_pages: u32,
    pub total: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_clamps() {
        let params = ListParams::new(0, 1000);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(ListParams::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_paged_result_navigation() {
        let params = ListParams::new(2, 3);
        let result = PagedResult::new(vec![4, 5, 6], 7, &params);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
        assert!(result.has_prev());

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, &ListParams::new(1, 3));
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
    }
}
