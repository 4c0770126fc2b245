//! Filter state controller.
//!
//! Owns the current [`FilterState`] and its query-string projection, applies
//! edits (debouncing free-text search) and publishes a [`FilterQuery`] for
//! every effective change. It performs no I/O.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::state::{FIRST_PAGE, FilterChange, FilterState};
use crate::cache::QueryKey;
use crate::config::DEFAULT_SEARCH_DEBOUNCE;

/// A query ready for the cache/transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterQuery {
    pub key: QueryKey,
    pub filters: FilterState,
    /// Increases with every emission. A result tagged with an older
    /// generation must not overwrite a newer one.
    pub generation: u64,
}

impl FilterQuery {
    fn new(filters: FilterState, generation: u64) -> Self {
        Self {
            key: filters.query_key(),
            filters,
            generation,
        }
    }

    /// Request parameters for the course list endpoint.
    pub fn params(&self) -> Vec<(String, String)> {
        self.key.query_pairs()
    }
}

struct ControllerState {
    filters: FilterState,
    query_string: String,
    pending_search: Option<String>,
    /// Bumped by every search edit; a debounce timer only fires if it still
    /// matches.
    search_epoch: u64,
    generation: u64,
}

struct ControllerInner {
    state: Mutex<ControllerState>,
    tx: watch::Sender<FilterQuery>,
    debounce: Duration,
}

impl ControllerInner {
    /// Publish the current filters. Call with the state lock held.
    fn emit(&self, state: &mut ControllerState) {
        state.generation += 1;
        state.query_string = state.filters.to_query_string();
        debug!(
            generation = state.generation,
            query = %state.query_string,
            "Filter query changed"
        );
        self.tx
            .send_replace(FilterQuery::new(state.filters.clone(), state.generation));
    }

    fn apply(&self, change: FilterChange) -> bool {
        let mut state = self.state.lock();
        if state.filters.apply(change) {
            self.emit(&mut state);
            true
        } else {
            false
        }
    }

    fn apply_pending_search(&self, epoch: u64) {
        let mut state = self.state.lock();
        if state.search_epoch != epoch {
            trace!(epoch, "Search edit superseded");
            return;
        }
        let Some(search) = state.pending_search.take() else {
            return;
        };
        if state.filters.apply(FilterChange::Search(search)) {
            self.emit(&mut state);
        }
    }
}

/// Cloneable handle; clones share state.
#[derive(Clone)]
pub struct FilterStateController {
    inner: Arc<ControllerInner>,
}

impl FilterStateController {
    /// Create a controller with default filters and the default debounce.
    pub fn new() -> Self {
        Self::with_state(FilterState::default(), DEFAULT_SEARCH_DEBOUNCE)
    }

    /// Create a controller restored from an incoming query string.
    pub fn from_query_str(query: &str, debounce: Duration) -> Self {
        Self::with_state(FilterState::from_query_str(query), debounce)
    }

    pub fn with_state(filters: FilterState, debounce: Duration) -> Self {
        let query_string = filters.to_query_string();
        let (tx, _) = watch::channel(FilterQuery::new(filters.clone(), 0));
        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(ControllerState {
                    filters,
                    query_string,
                    pending_search: None,
                    search_epoch: 0,
                    generation: 0,
                }),
                tx,
                debounce,
            }),
        }
    }

    /// Receive every published query; the current one is available immediately.
    pub fn subscribe(&self) -> watch::Receiver<FilterQuery> {
        self.inner.tx.subscribe()
    }

    /// The latest published query.
    pub fn current(&self) -> FilterQuery {
        self.inner.tx.borrow().clone()
    }

    pub fn filters(&self) -> FilterState {
        self.inner.state.lock().filters.clone()
    }

    /// Canonical query-string projection of the applied filters.
    pub fn query_string(&self) -> String {
        self.inner.state.lock().query_string.clone()
    }

    /// Search text waiting out the debounce window, if any.
    pub fn pending_search(&self) -> Option<String> {
        self.inner.state.lock().pending_search.clone()
    }

    /// Check if a result produced for `generation` may still be applied.
    pub fn is_current(&self, generation: u64) -> bool {
        self.inner.state.lock().generation == generation
    }

    /// Replace all filters from an incoming query string (e.g. navigation).
    pub fn restore(&self, query: &str) {
        let restored = FilterState::from_query_str(query);
        let mut state = self.inner.state.lock();
        state.pending_search = None;
        state.search_epoch += 1;
        state.filters = restored;
        self.inner.emit(&mut state);
    }

    /// Record a free-text search edit. It is applied once no further edit
    /// arrives for the debounce window.
    ///
    /// Outside a Tokio runtime there is no timer, so the edit applies at once.
    pub fn set_search(&self, search: impl Into<String>) {
        let search = search.into();
        let epoch = {
            let mut state = self.inner.state.lock();
            state.search_epoch += 1;
            state.pending_search = Some(search);
            state.search_epoch
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !self.inner.debounce.is_zero() => {
                let inner = Arc::clone(&self.inner);
                let debounce = self.inner.debounce;
                handle.spawn(async move {
                    tokio::time::sleep(debounce).await;
                    inner.apply_pending_search(epoch);
                });
            }
            _ => self.inner.apply_pending_search(epoch),
        }
    }

    /// Apply a pending search edit now instead of waiting (e.g. on Enter).
    pub fn flush_search(&self) {
        let epoch = self.inner.state.lock().search_epoch;
        self.inner.apply_pending_search(epoch);
    }

    /// Apply a change immediately. Returns whether anything changed.
    pub fn update(&self, change: FilterChange) -> bool {
        self.inner.apply(change)
    }

    pub fn set_page(&self, page: u32) -> bool {
        self.update(FilterChange::Page(page))
    }

    pub fn next_page(&self) -> bool {
        let page = self.inner.state.lock().filters.page();
        self.set_page(page.saturating_add(1))
    }

    pub fn prev_page(&self) -> bool {
        let page = self.inner.state.lock().filters.page();
        self.set_page(page.saturating_sub(1).max(FIRST_PAGE))
    }

    /// Reset every filter to its default; the query string becomes empty.
    pub fn clear_filters(&self) {
        let mut state = self.inner.state.lock();
        state.pending_search = None;
        state.search_epoch += 1;
        if !state.filters.is_default() {
            state.filters = FilterState::default();
            self.inner.emit(&mut state);
        }
    }
}

impl Default for FilterStateController {
    fn default() -> Self {
        Self::new()
    }
}
