//! Query session: the last filter result and its pagination window.
//!
//! A fresh submit runs the filter engine and shows [`PAGE_SIZE`] rows,
//! whatever `show_count` the request carried. "Load more" widens the window
//! by [`PAGE_SIZE`] over the retained result without running the filter
//! again. The retained request's `show_count` always mirrors the window.

use crate::config::{FilterRequest, PAGE_SIZE};
use crate::engine::Advisor;
use crate::error::Result;
use crate::types::ResultRow;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

/// The visible slice of a result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub rows: Vec<ResultRow>,
    pub show_count: usize,
    pub total: usize,
    pub has_more: bool,
}

impl Page {
    /// Window the first `show_count` rows of `results`.
    pub fn new(results: &[ResultRow], show_count: usize) -> Self {
        Self {
            rows: results.iter().take(show_count).cloned().collect(),
            show_count,
            total: results.len(),
            has_more: results.len() > show_count,
        }
    }
}

#[derive(Debug)]
struct LastQuery {
    request: FilterRequest,
    results: Vec<ResultRow>,
}

/// Holds the most recent (request, results) pair for one user.
#[derive(Debug)]
pub struct QuerySession {
    advisor: Advisor,
    last: RwLock<Option<LastQuery>>,
}

static_assertions::assert_impl_all!(QuerySession: Send, Sync);

impl QuerySession {
    pub fn new(advisor: Advisor) -> Self {
        Self {
            advisor,
            last: RwLock::new(None),
        }
    }

    pub fn advisor(&self) -> &Advisor {
        &self.advisor
    }

    /// Run a fresh filter and reset the window to [`PAGE_SIZE`].
    pub fn submit(&self, mut request: FilterRequest) -> Result<Page> {
        let results = self.advisor.filter(&request)?;
        if request.show_count != PAGE_SIZE {
            debug!(requested = request.show_count, "Fresh query resets show_count");
            request.show_count = PAGE_SIZE;
        }
        let page = Page::new(&results, request.show_count);

        *self.last.write() = Some(LastQuery { request, results });
        Ok(page)
    }

    /// Widen the window by [`PAGE_SIZE`] over the last results.
    ///
    /// Returns `None` when nothing has been submitted yet.
    pub fn load_more(&self) -> Option<Page> {
        let mut guard = self.last.write();
        let last = guard.as_mut()?;
        last.request.show_count += PAGE_SIZE;
        let show_count = last.request.show_count;
        debug!(show_count, total = last.results.len(), "Load more");
        Some(Page::new(&last.results, show_count))
    }

    /// The current window, if a query has been submitted.
    pub fn current(&self) -> Option<Page> {
        self.last
            .read()
            .as_ref()
            .map(|last| Page::new(&last.results, last.request.show_count))
    }

    /// The request behind the current results, with `show_count` set to
    /// the current window.
    pub fn last_request(&self) -> Option<FilterRequest> {
        self.last.read().as_ref().map(|last| last.request.clone())
    }
}
