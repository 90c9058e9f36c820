//! Paging parameters shared by the control-plane listings

use serde::Serialize;

/// Page used when none is given
pub const DEFAULT_PAGE: i64 = 1;
/// Page size used when none is given
pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// Largest page size; out-of-range sizes are replaced by this value
pub const MAX_PAGE_SIZE: i64 = 100;

/// Normalized paging window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub size: i64,
}

impl PageParams {
    /// Normalize raw values: a page below 1 becomes 1, a size of zero or less or above
    /// [`MAX_PAGE_SIZE`] becomes [`MAX_PAGE_SIZE`].
    pub fn new(page: Option<i64>, size: Option<i64>) -> Self {
        let page = page.unwrap_or(DEFAULT_PAGE).max(1);
        let size = match size.unwrap_or(DEFAULT_PAGE_SIZE) {
            s if s <= 0 || s > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
            s => s,
        };
        Self { page, size }
    }

    #[inline]
    pub fn limit(&self) -> i64 {
        self.size
    }

    #[inline]
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.size)
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus the total number of matching rows
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub count: i64,
}

impl<T> Paged<T> {
    pub fn new(data: Vec<T>, count: i64) -> Self {
        Self { data, count }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            data: self.data.into_iter().map(f).collect(),
            count: self.count,
        }
    }
}
