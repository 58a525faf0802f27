use std::{
    num::NonZeroUsize,
    ops::{Range, RangeInclusive},
    sync::Arc,
};

use serde::Serialize;
use tracing::debug;

pub const DEFAULT_INITIAL_PAGE: usize = 1;

/// Snapshot of the cursor for presentation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub current_page: usize,
    pub items_per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Page cursor over a shared, replaceable sequence.
///
/// Pages are 1-based. When the sequence shrinks so that the current page
/// falls past its end, the cursor snaps back to page 1. An empty sequence
/// has zero pages and is never corrected.
#[derive(Debug, Clone)]
pub struct Paginator<T> {
    items: Arc<[T]>,
    items_per_page: NonZeroUsize,
    current_page: usize,
}

impl<T> Paginator<T> {
    pub fn new(items_per_page: NonZeroUsize) -> Self {
        Self::with_initial_page(items_per_page, DEFAULT_INITIAL_PAGE)
    }

    pub fn with_initial_page(items_per_page: NonZeroUsize, initial_page: usize) -> Self {
        Self {
            items: Arc::from(Vec::new()),
            items_per_page,
            current_page: initial_page,
        }
    }

    /// Replaces the input sequence, then applies self-correction. Returns
    /// true when the cursor had to be reset.
    pub fn set_items(&mut self, items: impl Into<Arc<[T]>>) -> bool {
        self.items = items.into();
        self.self_correct()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    pub fn items_per_page(&self) -> usize {
        self.items_per_page.get()
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        self.items.len().div_ceil(self.items_per_page.get())
    }

    /// Index range of the current page within the input, clipped to its
    /// length. Empty when the cursor points past the end.
    pub fn page_range(&self) -> Range<usize> {
        let len = self.items.len();
        let Some(first) = self.current_page.checked_sub(1) else {
            return 0..0;
        };
        let start = first.saturating_mul(self.items_per_page.get());
        if start >= len {
            return len..len;
        }
        let end = start.saturating_add(self.items_per_page.get()).min(len);
        start..end
    }

    pub fn current_items(&self) -> &[T] {
        &self.items[self.page_range()]
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page < self.total_pages()
    }

    pub fn has_prev_page(&self) -> bool {
        self.current_page > 1
    }

    pub fn next_page(&mut self) {
        if self.has_next_page() {
            self.current_page += 1;
        }
    }

    pub fn prev_page(&mut self) {
        if self.has_prev_page() {
            self.current_page -= 1;
        }
    }

    /// Moves to `page` if it exists; out-of-range requests are ignored.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        if page >= 1 && page <= self.total_pages() {
            self.current_page = page;
            true
        } else {
            false
        }
    }

    /// Direct set used by page-number controls. Not clamped; only the
    /// self-correction rule applies afterwards.
    pub fn set_current_page(&mut self, page: usize) {
        self.current_page = page;
        self.self_correct();
    }

    /// Page numbers for a page-number control. Empty when there is at most
    /// one page, since no control is shown then.
    pub fn page_numbers(&self) -> RangeInclusive<usize> {
        match self.total_pages() {
            total @ 2.. => 1..=total,
            _ => 1..=0,
        }
    }

    pub fn state(&self) -> PaginationState {
        PaginationState {
            current_page: self.current_page,
            items_per_page: self.items_per_page.get(),
            total_items: self.items.len(),
            total_pages: self.total_pages(),
        }
    }

    fn self_correct(&mut self) -> bool {
        let off_page = self.current_page != 1 && self.page_range().is_empty();
        if off_page && !self.items.is_empty() {
            debug!(
                page = self.current_page,
                total_items = self.items.len(),
                "page cursor past end of input, resetting to first page"
            );
            self.current_page = 1;
            return true;
        }
        false
    }
}
