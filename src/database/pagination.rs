use serde::{Deserialize, Serialize};

use crate::constants::MAX_COUNT_PER_PAGE;

/// Page-based pagination query. `page` is 1-based; `limit` overrides the
/// endpoint's default page size.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_COUNT_PER_PAGE)
    }

    pub fn offset(&self, default: i64) -> i64 {
        (self.page() - 1) * self.page_size(default)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PageContext<T> {
    pub rows: Vec<T>,
    pub total_rows: i64,
    pub page: i64,
    pub page_size: i64,
    pub page_count: i64,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page_size: i64, page: i64) -> Self {
        if rows.is_empty() {
            return Self::no_rows(page_size);
        }
        let page_count = (total_rows + page_size - 1) / page_size;

        Self {
            rows,
            total_rows,
            page: page.min(page_count),
            page_size,
            page_count,
        }
    }

    pub fn no_rows(page_size: i64) -> Self {
        Self {
            rows: vec![],
            total_rows: 0,
            page: 1,
            page_size,
            page_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_follows_page_and_limit() {
        let query = PageQuery::new(3, 10);
        assert_eq!(query.offset(6), 20);
    }

    #[test]
    fn missing_parameters_fall_back_to_defaults() {
        let query = PageQuery {
            page: None,
            limit: None,
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(6), 6);
        assert_eq!(query.offset(6), 0);
    }

    #[test]
    fn page_size_is_clamped() {
        let query = PageQuery::new(1, 100000);
        assert_eq!(query.page_size(6), MAX_COUNT_PER_PAGE);

        let query = PageQuery::new(1, 0);
        assert_eq!(query.page_size(6), 1);
    }

    #[test]
    fn page_count_rounds_up() {
        let context = PageContext::from_rows(vec![1, 2, 3], 13, 6, 1);
        assert_eq!(context.page_count, 3);
        assert_eq!(context.total_rows, 13);
    }

    #[test]
    fn empty_rows_collapse_to_no_rows() {
        let context: PageContext<i32> = PageContext::from_rows(vec![], 0, 6, 4);
        assert_eq!(context.page, 1);
        assert_eq!(context.page_count, 0);
    }
}
