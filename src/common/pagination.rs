// src/common/pagination.rs

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

// Query string shared by every paginated listing (?current=1&size=10&keyword=...)
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub current: Option<i64>,
    pub size: Option<i64>,
    pub keyword: Option<String>,
}

impl PageQuery {
    /// Page number clamped to `>= 1`.
    pub fn current(&self) -> i64 {
        self.current.filter(|c| *c >= 1).unwrap_or(1)
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn size(&self) -> i64 {
        match self.size {
            Some(s) if s >= 1 => s.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows to skip; saturates instead of overflowing for absurd page numbers.
    pub fn offset(&self) -> i64 {
        (self.current() - 1).saturating_mul(self.size())
    }

    /// Keyword trimmed, `None` when blank.
    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub current: i64,
    pub size: i64,
    pub total: i64,
    pub pages: i64,
    pub records: Vec<T>,
}

impl<T> PageResult<T> {
    pub fn new(page: &PageQuery, total: i64, records: Vec<T>) -> Self {
        let size = page.size();
        let pages = if total == 0 { 0 } else { (total + size - 1) / size };
        Self { current: page.current(), size, total, pages, records }
    }
}
