//! Shared pagination types for API query parameters.
//!
//! All list endpoints use page-based pagination with `page` and `page_size`
//! parameters. `page` is 1-based.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// Default number of items to return per page.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Maximum number of items that can be requested per page.
pub const MAX_PAGE_SIZE: i64 = 200;

/// Standard pagination parameters for list endpoints.
///
/// The `page_size` is clamped to ensure it's always between 1 and 200,
/// preventing both zero-result queries and excessive data fetching.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    /// 1-based page number (default: 1)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page: Option<i64>,

    /// Maximum number of items to return (default: 100, max: 200)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page_size: Option<i64>,
}

impl Pagination {
    /// Get the page value, defaulting to 1 if not specified or out of range.
    #[inline]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Get the page size, clamped between 1 and MAX_PAGE_SIZE.
    /// Defaults to DEFAULT_PAGE_SIZE if not specified.
    #[inline]
    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// Row offset corresponding to the requested page.
    #[inline]
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.page_size()
    }
}

/// Generic paginated response wrapper for list endpoints.
///
/// Wraps a list of items with pagination metadata including total count
/// for client-side pagination calculations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// Total number of items matching the query (before pagination)
    pub count: i64,
    /// The requested page
    pub page: i64,
    /// Maximum items returned per page
    pub page_size: i64,
    /// The items for the current page
    pub results: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    pub fn new(results: Vec<T>, count: i64, pagination: &Pagination) -> Self {
        Self {
            count,
            page: pagination.page(),
            page_size: pagination.page_size(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let p = Pagination::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_page_size_clamping() {
        // Zero is clamped to 1
        let p = Pagination {
            page: None,
            page_size: Some(0),
        };
        assert_eq!(p.page_size(), 1);

        // Over max is clamped to MAX_PAGE_SIZE
        let p = Pagination {
            page: None,
            page_size: Some(1000),
        };
        assert_eq!(p.page_size(), MAX_PAGE_SIZE);

        // Valid value passes through
        let p = Pagination {
            page: None,
            page_size: Some(50),
        };
        assert_eq!(p.page_size(), 50);
    }

    #[test]
    fn test_offset() {
        let p = Pagination {
            page: Some(3),
            page_size: Some(50),
        };
        assert_eq!(p.offset(), 100);

        // Page below 1 is treated as page 1
        let p = Pagination {
            page: Some(0),
            page_size: Some(50),
        };
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_query_string_round_trip() {
        let p: Pagination = serde_urlencoded::from_str("page=2&page_size=25").unwrap();
        assert_eq!(p.page(), 2);
        assert_eq!(p.page_size(), 25);
    }
}
