//! Pagination types shared by every listing
//!
//! Pages are 1-indexed. A request for a page past either end is clamped to
//! the nearest valid page instead of failing, and an empty result set still
//! has exactly one (empty) page.

use serde::{Deserialize, Serialize};

/// Requested page and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page,
            per_page: per_page.max(1),
        }
    }

    /// First page of the given size
    pub fn first(per_page: i64) -> Self {
        Self::new(1, per_page)
    }

    /// Resolve against a known total, clamping the page into range
    pub fn resolve(&self, total_count: i64) -> PageInfo {
        let per_page = self.per_page.max(1);
        let total_count = total_count.max(0);
        let num_pages = ((total_count + per_page - 1) / per_page).max(1);
        let number = self.page.clamp(1, num_pages);

        let (start_index, end_index) = if total_count == 0 {
            (0, 0)
        } else {
            let start = (number - 1) * per_page + 1;
            (start, (start + per_page - 1).min(total_count))
        };

        PageInfo {
            number,
            per_page,
            num_pages,
            has_next: number < num_pages,
            has_previous: number > 1,
            next_page: (number < num_pages).then_some(number + 1),
            previous_page: (number > 1).then_some(number - 1),
            start_index,
            end_index,
        }
    }
}

/// Where a page sits within the whole result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Current page number after clamping
    pub number: i64,
    pub per_page: i64,
    pub num_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page: Option<i64>,
    pub previous_page: Option<i64>,
    /// 1-based index of the first item on this page, 0 when empty
    pub start_index: i64,
    /// 1-based index of the last item on this page, 0 when empty
    pub end_index: i64,
}

impl PageInfo {
    /// Row offset for LIMIT/OFFSET queries
    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// One page of results plus the envelope every listing returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
    /// True when there is more than one page
    pub is_paginated: bool,
    pub total_count: i64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, page_info: PageInfo, total_count: i64) -> Self {
        Self {
            is_paginated: page_info.num_pages > 1,
            items,
            page_info,
            total_count,
        }
    }

    /// The empty first page for a request
    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request.resolve(0), 0)
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            page_info: self.page_info,
            is_paginated: self.is_paginated,
            total_count: self.total_count,
        }
    }
}
