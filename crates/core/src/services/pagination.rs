//! Page/limit handling shared by the list endpoints.

use serde::Serialize;

/// Default page size.
pub const DEFAULT_LIMIT: u64 = 20;

/// Largest page size a caller may ask for.
pub const MAX_LIMIT: u64 = 100;

/// Largest page number accepted. Keeps the row offset within a SQL `BIGINT`.
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_LIMIT;

/// A normalized page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u64,
    /// Page size, within `1..=MAX_LIMIT`.
    pub limit: u64,
}

impl PageRequest {
    /// Clamp raw query values. Missing or zero values fall back to defaults.
    #[must_use]
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1).min(MAX_PAGE),
            limit: limit
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_LIMIT)
                .min(MAX_LIMIT),
        }
    }

    /// Row offset of the first item on this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Pagination block for a result of `total` rows.
    #[must_use]
    pub const fn paginate(&self, total: u64) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            pages: total.div_ceil(self.limit),
        }
    }
}

/// Pagination metadata returned next to a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        let req = PageRequest::new(None, None);
        assert_eq!(req, PageRequest { page: 1, limit: 20 });

        let req = PageRequest::new(Some(0), Some(500));
        assert_eq!(req, PageRequest { page: 1, limit: 100 });
    }

    #[test]
    fn test_huge_page_is_clamped() {
        let req = PageRequest::new(Some(u64::MAX), Some(20));
        assert_eq!(req.page, MAX_PAGE);
        assert!(i64::try_from(req.offset()).is_ok());

        let req = PageRequest::new(Some(u64::MAX), Some(u64::MAX));
        assert!(i64::try_from(req.offset()).is_ok());
    }

    #[test]
    fn test_paginate() {
        let req = PageRequest::new(Some(3), Some(10));
        assert_eq!(req.offset(), 20);

        let p = req.paginate(41);
        assert_eq!(p.pages, 5);
        assert_eq!(p.total, 41);

        assert_eq!(req.paginate(0).pages, 0);
    }
}
