use serde::Serialize;

use crate::storage::MAX_RESULTS;

pub const DEFAULT_PAGE_MAX: i64 = 10;
pub const MIN_PAGE_MAX: i64 = 10;

pub fn clamp_page_max(page_max: i64) -> i64 {
    page_max.clamp(MIN_PAGE_MAX, MAX_RESULTS)
}

/// The slice of a result set shown on one page.
///
/// `start` and `end` are 1-based and inclusive, both 0 for an empty result.
/// `prev`/`next` are the indexes of the neighbouring pages, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub index: i64,
    pub page_max: i64,
    pub total: i64,
    pub start: i64,
    pub end: i64,
    pub prev: Option<i64>,
    pub next: Option<i64>,
}

impl PageWindow {
    /// An `index` past the last record moves to the start of the last page.
    pub fn new(index: i64, page_max: i64, total: i64) -> Self {
        let page_max = clamp_page_max(page_max);
        let total = total.max(0);
        let mut index = index.max(0);
        if index >= total {
            index = if total == 0 {
                0
            } else {
                (total - 1) / page_max * page_max
            };
        }

        let (start, end) = if total == 0 {
            (0, 0)
        } else {
            (index + 1, (index + page_max).min(total))
        };

        Self {
            index,
            page_max,
            total,
            start,
            end,
            prev: (index > 0).then(|| (index - page_max).max(0)),
            next: (end < total).then_some(index + page_max),
        }
    }

    /// Rows to fetch for this page.
    pub fn len(&self) -> i64 {
        if self.total == 0 {
            0
        } else {
            self.end - self.index
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One page of results plus its window.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(flatten)]
    pub window: PageWindow,
}
