//! Reusable cursor modifiers: pagination, sorting, extra filtering.
//!
//! Each shape is a plain value that implements
//! [`CursorModifier`](crate::ops::CursorModifier), so it can be baked into an
//! operation descriptor or attached per call.

use serde::Serialize;

use crate::{
    driver::{DriverCursor, SortDirection},
    ops::CursorModifier,
};

/// Window pagination over a known total count.
///
/// Out-of-range page numbers clamp into the valid range instead of failing,
/// so a stale page link after deletions still renders the nearest page.
#[derive(Debug, Clone, Serialize)]
pub struct Paginator {
    page: i64,
    per_page: i64,
    total_count: i64,
}

impl Paginator {
    pub fn new(page: i64, per_page: i64, total_count: i64) -> Self {
        Self {
            page,
            per_page: per_page.max(1),
            total_count: total_count.max(0),
        }
    }

    /// The number of pages needed to show every record.
    pub fn page_count(&self) -> i64 {
        if self.total_count == 0 {
            0
        } else {
            (self.total_count + self.per_page - 1) / self.per_page
        }
    }

    /// The requested page clamped into the valid range. An empty result set
    /// still has a current page of 1.
    pub fn current_page(&self) -> i64 {
        self.page.clamp(1, self.page_count().max(1))
    }

    /// Whether the current page is the first one.
    pub fn is_first(&self) -> bool {
        self.current_page() == 1
    }

    /// Whether the current page is the last one.
    pub fn is_last(&self) -> bool {
        self.current_page() >= self.page_count()
    }

    pub fn has_prev(&self) -> bool {
        !self.is_first()
    }

    pub fn has_next(&self) -> bool {
        !self.is_last()
    }

    /// How many records to skip for the current page.
    pub fn skip(&self) -> u64 {
        ((self.current_page() - 1) * self.per_page) as u64
    }

    /// The page size.
    pub fn limit(&self) -> u64 {
        self.per_page as u64
    }

    /// Page numbers for a pagination widget: the full range when there are
    /// at most ten pages, otherwise a ten-wide window around the current
    /// page, clamped to the ends.
    pub fn iterate_pages(&self) -> Vec<i64> {
        let pages = self.page_count();
        if pages <= 10 {
            return (1..=pages).collect();
        }
        let start = (self.current_page() - 5).clamp(1, pages - 9);
        (start..start + 10).collect()
    }
}

impl CursorModifier for Paginator {
    fn reshape(&self, mut cursor: Box<dyn DriverCursor>) -> Box<dyn DriverCursor> {
        cursor.skip(self.skip());
        cursor.limit(self.limit());
        cursor
    }
}

/// An ordered list of sort criteria.
#[derive(Debug, Clone, Default)]
pub struct Sorter {
    params: Vec<(String, SortDirection)>,
}

impl Sorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sort criterion; criteria apply in insertion order.
    pub fn param(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.add(field, direction);
        self
    }

    pub fn asc(self, field: impl Into<String>) -> Self {
        self.param(field, SortDirection::Asc)
    }

    pub fn desc(self, field: impl Into<String>) -> Self {
        self.param(field, SortDirection::Desc)
    }

    pub fn add(&mut self, field: impl Into<String>, direction: SortDirection) {
        self.params.push((field.into(), direction));
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &[(String, SortDirection)] {
        &self.params
    }
}

impl CursorModifier for Sorter {
    fn reshape(&self, mut cursor: Box<dyn DriverCursor>) -> Box<dyn DriverCursor> {
        if !self.params.is_empty() {
            cursor.sort(self.params.clone());
        }
        cursor
    }
}

/// Extra selection criteria spliced into a query after the fact.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    params: bson::Document,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, field: impl Into<String>, value: impl Into<bson::Bson>) -> Self {
        self.add(field, value);
        self
    }

    pub fn add(&mut self, field: impl Into<String>, value: impl Into<bson::Bson>) {
        self.params.insert(field.into(), value.into());
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &bson::Document {
        &self.params
    }
}

impl CursorModifier for Filter {
    fn reshape(&self, mut cursor: Box<dyn DriverCursor>) -> Box<dyn DriverCursor> {
        if !self.params.is_empty() {
            cursor.filter(self.params.clone());
        }
        cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocmapResult;
    use async_trait::async_trait;
    use bson::{Bson, doc};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Record {
        skip: Option<u64>,
        limit: Option<u64>,
        sort: Vec<(String, SortDirection)>,
        filter: Option<bson::Document>,
    }

    struct RecordingCursor {
        record: Arc<Mutex<Record>>,
    }

    #[async_trait]
    impl DriverCursor for RecordingCursor {
        fn skip(&mut self, n: u64) {
            self.record.lock().skip = Some(n);
        }

        fn limit(&mut self, n: u64) {
            self.record.lock().limit = Some(n);
        }

        fn sort(&mut self, params: Vec<(String, SortDirection)>) {
            self.record.lock().sort = params;
        }

        fn filter(&mut self, criteria: bson::Document) {
            self.record.lock().filter = Some(criteria);
        }

        async fn to_list(self: Box<Self>) -> DocmapResult<Bson> {
            Ok(Bson::Array(Vec::new()))
        }

        async fn count(self: Box<Self>) -> DocmapResult<Bson> {
            Ok(Bson::Int64(0))
        }
    }

    fn reshape(modifier: &dyn CursorModifier) -> Arc<Mutex<Record>> {
        let record = Arc::new(Mutex::new(Record::default()));
        let cursor = RecordingCursor { record: Arc::clone(&record) };
        drop(modifier.reshape(Box::new(cursor)));
        record
    }

    #[test]
    fn paginator_computes_page_geometry() {
        let pager = Paginator::new(1, 10, 25);
        assert_eq!(pager.page_count(), 3);
        assert_eq!(pager.skip(), 0);
        assert_eq!(pager.limit(), 10);
        assert!(pager.is_first());
        assert!(!pager.is_last());

        let pager = Paginator::new(3, 10, 95);
        assert_eq!(pager.page_count(), 10);
        assert_eq!(pager.current_page(), 3);
        assert_eq!(pager.skip(), 20);
        assert!(pager.has_prev());
        assert!(pager.has_next());
    }

    #[test]
    fn paginator_clamps_out_of_range_pages() {
        let pager = Paginator::new(99, 10, 25);
        assert_eq!(pager.current_page(), 3);
        assert_eq!(pager.skip(), 20);
        assert!(pager.is_last());
        let pager = Paginator::new(-2, 10, 45);
        assert_eq!(pager.current_page(), 1);
        let pager = Paginator::new(1, 10, 0);
        assert_eq!(pager.page_count(), 0);
        assert_eq!(pager.current_page(), 1);
        assert_eq!(pager.skip(), 0);
    }

    #[test]
    fn short_ranges_list_every_page() {
        let pager = Paginator::new(2, 10, 95);
        assert_eq!(pager.iterate_pages(), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn long_ranges_window_around_the_current_page() {
        let pager = Paginator::new(20, 10, 400);
        assert_eq!(pager.iterate_pages(), (15..=24).collect::<Vec<_>>());
        // Window pinned to the left edge.
        let pager = Paginator::new(2, 10, 400);
        assert_eq!(pager.iterate_pages(), (1..=10).collect::<Vec<_>>());
        // Window pinned to the right edge.
        let pager = Paginator::new(40, 10, 400);
        assert_eq!(pager.iterate_pages(), (31..=40).collect::<Vec<_>>());
    }

    #[test]
    fn paginator_reshapes_skip_and_limit() {
        let record = reshape(&Paginator::new(3, 10, 95));
        let record = record.lock();
        assert_eq!(record.skip, Some(20));
        assert_eq!(record.limit, Some(10));
    }

    #[test]
    fn sorter_applies_params_in_order() {
        let sorter = Sorter::new().desc("created").asc("title");
        let record = reshape(&sorter);
        let record = record.lock();
        assert_eq!(record.sort.len(), 2);
        assert_eq!(record.sort[0].0, "created");
        assert_eq!(record.sort[0].1, SortDirection::Desc);

        let empty = reshape(&Sorter::new());
        assert!(empty.lock().sort.is_empty());
    }

    #[test]
    fn filter_splices_extra_criteria() {
        let filter = Filter::new().param("status", "published");
        let record = reshape(&filter);
        assert_eq!(record.lock().filter, Some(doc! { "status": "published" }));

        let empty = reshape(&Filter::new());
        assert_eq!(empty.lock().filter, None);
    }
}
