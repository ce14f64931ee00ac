//! Pagination types.

use serde::{Deserialize, Serialize};

/// Default number of records per page.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Page numbers below 1 are treated as 1, and a zero page size as the default.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: if per_page == 0 { DEFAULT_PER_PAGE } else { per_page },
        }
    }

    /// Cap the page size.
    pub fn clamp_to(self, max_per_page: u32) -> Self {
        Self {
            page: self.page,
            per_page: self.per_page.min(max_per_page.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

/// One page of a filtered listing.
///
/// A page past the end is returned empty rather than as an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    /// Number of records matching the filter across all pages
    pub total: u64,
    /// Number of pages
    pub pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let per_page = u64::from(request.per_page.max(1));
        let pages = total.div_ceil(per_page);
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            pages: u32::try_from(pages).unwrap_or(u32::MAX),
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_normalization() {
        let req = PageRequest::new(0, 0);
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, DEFAULT_PER_PAGE);
        assert_eq!(req.offset(), 0);

        assert_eq!(PageRequest::new(3, 10).offset(), 20);
        assert_eq!(PageRequest::new(1, 500).clamp_to(100).per_page, 100);
    }

    #[test]
    fn test_page_counts() {
        let page: Page<u32> = Page::new(vec![1, 2], PageRequest::new(2, 2), 5);
        assert_eq!(page.pages, 3);
        assert!(page.has_next());
        assert!(page.has_prev());

        let empty: Page<u32> = Page::new(vec![], PageRequest::new(1, 20), 0);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_next());
        assert!(!empty.has_prev());
    }
}
