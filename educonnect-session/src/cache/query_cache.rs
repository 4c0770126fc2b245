//! Query result cache.
//!
//! This module provides a thread-safe cache for query results with a
//! staleness window per entry and request deduplication.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::key::QueryKey;
use crate::config::DEFAULT_CACHE_STALE;
use crate::error::ApiError;
use crate::utils::InFlight;

/// Result shared by every caller of a deduplicated fetch.
pub type FetchResult<V> = Result<V, ApiError>;

type InFlightRequest<V> = Arc<InFlight<FetchResult<V>>>;

/// A cached result with its staleness window.
#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
    stale_after: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, stale_after: Duration) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            stale_after,
        }
    }

    /// A window too large to represent never expires.
    fn is_stale(&self) -> bool {
        self.fetched_at
            .checked_add(self.stale_after)
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    Hit(V),
    Miss,
}

impl<V> CacheLookup<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Keyed result cache.
///
/// A stale entry is a miss; the caller blocks on the refetch. Concurrent
/// fetches of the same key share one producer run, and every one of them sees
/// its result, error included. Cloning shares the underlying maps.
pub struct QueryCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    /// In-flight requests for deduplication.
    in_flight: Arc<DashMap<String, InFlightRequest<V>>>,
    stale_after: Duration,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            in_flight: Arc::clone(&self.in_flight),
            stale_after: self.stale_after,
        }
    }
}

impl<V: Clone + Send + Sync + 'static> QueryCache<V> {
    /// Create a cache with the default staleness window (5 minutes).
    pub fn new() -> Self {
        Self::with_stale_after(DEFAULT_CACHE_STALE)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            stale_after,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Read a key without fetching.
    pub fn get(&self, key: &QueryKey) -> CacheLookup<V> {
        match self.lookup(&key.to_string()) {
            Some(value) => CacheLookup::Hit(value),
            None => CacheLookup::Miss,
        }
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;

        if entry.is_stale() {
            drop(entry); // Release the lock before removing
            self.entries.remove_if(key, |_, entry| entry.is_stale());
            return None;
        }

        Some(entry.value.clone())
    }

    /// Store a value with the default staleness window.
    pub fn insert(&self, key: &QueryKey, value: V) {
        self.insert_with_ttl(key, value, self.stale_after);
    }

    pub fn insert_with_ttl(&self, key: &QueryKey, value: V, stale_after: Duration) {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, stale_after));
    }

    /// Return the cached value, or run `producer` and cache its result.
    pub async fn fetch<F, Fut>(&self, key: &QueryKey, producer: F) -> FetchResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>>,
    {
        self.fetch_with_ttl(key, self.stale_after, producer).await
    }

    /// Like [`fetch`](Self::fetch) with a per-key staleness window.
    pub async fn fetch_with_ttl<F, Fut>(
        &self,
        key: &QueryKey,
        stale_after: Duration,
        producer: F,
    ) -> FetchResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>>,
    {
        let key = key.to_string();

        loop {
            if let Some(value) = self.lookup(&key) {
                trace!(%key, "Cache hit");
                return Ok(value);
            }

            let (request, is_new) = self.get_or_create_in_flight(&key);
            if !is_new {
                debug!(%key, "Joining in-flight fetch");
                match request.wait().await {
                    // The fetch we joined was abandoned by its caller; try again.
                    Err(ApiError::Cancelled) => continue,
                    result => return result,
                }
            }

            // Double-check after registering (another fetch may have just completed)
            if let Some(value) = self.lookup(&key) {
                self.settle(&key, &request, Ok(value.clone()), None);
                return Ok(value);
            }

            debug!(%key, "Cache miss; fetching");
            let mut pending = PendingFetch {
                cache: self,
                key: &key,
                request: &request,
                settled: false,
            };
            let result = producer().await;
            pending.finish(result.clone(), stale_after);
            return result;
        }
    }

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// In-flight fetches under the prefix are detached: their callers still get
    /// the result, but it is not stored. Returns the number of entries removed.
    pub fn invalidate(&self, prefix: &str) -> usize {
        // Detach first so a fetch completing concurrently cannot re-store
        // after the entries are swept.
        self.in_flight.retain(|key, _| !key.starts_with(prefix));

        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        debug!(%prefix, removed, "Invalidated cached queries");
        removed
    }

    /// Drop everything, detaching all in-flight fetches.
    pub fn clear(&self) {
        self.in_flight.clear();
        self.entries.clear();
    }

    /// Get the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all stale entries from the cache.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.len();
        self.entries.retain(|_, entry| !entry.is_stale());
        before.saturating_sub(self.len())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len(),
            in_flight_count: self.in_flight.len(),
            stale_after: self.stale_after,
        }
    }

    /// Check if there's an in-flight fetch for a key.
    pub fn has_in_flight(&self, key: &QueryKey) -> bool {
        self.in_flight.contains_key(&key.to_string())
    }

    // ========== Request Deduplication ==========

    /// Returns (request, is_new) where is_new means the caller must run the producer.
    fn get_or_create_in_flight(&self, key: &str) -> (InFlightRequest<V>, bool) {
        if let Some(existing) = self.in_flight.get(key) {
            return (existing.clone(), false);
        }

        let request = Arc::new(InFlight::new());

        // Use entry API to handle race condition
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                entry.insert(request.clone());
                (request, true)
            }
        }
    }

    /// Publish a fetch outcome.
    ///
    /// Only the request still registered for the key may store its value; a
    /// detached or superseded one just wakes its own waiters.
    fn settle(
        &self,
        key: &str,
        request: &InFlightRequest<V>,
        result: FetchResult<V>,
        store_for: Option<Duration>,
    ) {
        if let Entry::Occupied(entry) = self.in_flight.entry(key.to_string()) {
            if Arc::ptr_eq(entry.get(), request) {
                if let (Ok(value), Some(stale_after)) = (&result, store_for) {
                    self.entries
                        .insert(key.to_string(), CacheEntry::new(value.clone(), stale_after));
                }
                entry.remove();
            } else {
                trace!(%key, "Fetch superseded; result not stored");
            }
        } else if store_for.is_some() {
            debug!(%key, "Fetch detached by invalidation; result not stored");
        }

        request.set_result(result);
    }
}

impl<V: Clone + Send + Sync + 'static> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Settles the in-flight request with `Cancelled` if the producer future is
/// dropped before finishing, so joined callers do not wait forever.
struct PendingFetch<'a, V: Clone + Send + Sync + 'static> {
    cache: &'a QueryCache<V>,
    key: &'a str,
    request: &'a InFlightRequest<V>,
    settled: bool,
}

impl<V: Clone + Send + Sync + 'static> PendingFetch<'_, V> {
    fn finish(&mut self, result: FetchResult<V>, stale_after: Duration) {
        self.settled = true;
        self.cache
            .settle(self.key, self.request, result, Some(stale_after));
    }
}

impl<V: Clone + Send + Sync + 'static> Drop for PendingFetch<'_, V> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(key = %self.key, "Fetch abandoned before completion");
            self.cache
                .settle(self.key, self.request, Err(ApiError::Cancelled), None);
        }
    }
}

/// Statistics about the query cache.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of entries in the cache.
    pub entry_count: usize,
    /// Number of in-flight fetches.
    pub in_flight_count: usize,
    /// Default staleness window.
    pub stale_after: Duration,
}
