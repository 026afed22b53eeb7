//! Pagination and query-shaping helpers shared by the store
//! implementations.

use serde::Serialize;

/// Pagination parameters
#[derive(Debug, Clone)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub sort_order: SortOrder,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
            sort_order: SortOrder::Desc,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
            ..Default::default()
        }
    }

    /// Build from the limit/offset style used by the list endpoints
    pub fn from_limit_offset(limit: Option<i64>, offset: Option<i64>) -> Self {
        let per_page = limit.unwrap_or(50).clamp(1, 100) as u32;
        let offset = offset.unwrap_or(0).max(0) as u32;
        Self {
            page: offset / per_page + 1,
            per_page,
            sort_order: SortOrder::Desc,
        }
    }

    pub fn offset(&self) -> i64 {
        ((self.page - 1) * self.per_page) as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Sort order for queries
#[derive(Debug, Clone, Copy, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// One page of results plus the unpaged total
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64) -> Self {
        Self { items, total }
    }
}
