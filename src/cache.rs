//! Shared query cache
//!
//! One `QueryClient` per application instance, shared as `Arc<QueryClient>`.
//! Services read and write entries by `QueryKey` and invalidate whole
//! resources by key prefix. Entries are type-erased so any cloneable result
//! can be cached.

use crate::cache_key::QueryKey;
use crate::cache_ttl::QueryOptions;
use crate::observability::metrics;
use dashmap::DashMap;
use parking_lot::Mutex; // PERFORMANCE: no poisoning, short critical sections
use serde::Serialize;
use shared::{AppError, Result};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MIN_GC_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// CACHE ENTRY STRUCTURES
// ============================================================================

#[derive(Clone)]
struct CacheEntry {
    data: Arc<dyn Any + Send + Sync>,
    updated_at: Instant,
    last_accessed: Instant,
    gc_time: Duration,
    invalidated: bool,
}

impl CacheEntry {
    fn new(data: Arc<dyn Any + Send + Sync>, gc_time: Duration, invalidated: bool) -> Self {
        let now = Instant::now();
        Self {
            data,
            updated_at: now,
            last_accessed: now,
            gc_time,
            invalidated,
        }
    }

    fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.invalidated && self.updated_at.elapsed() < stale_time
    }
}

/// Public snapshot of an entry's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryState {
    pub updated_at: Instant,
    pub is_invalidated: bool,
}

impl QueryState {
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.is_invalidated || self.updated_at.elapsed() >= stale_time
    }
}

/// Change notifications for observers attached to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(QueryKey),
    Invalidated(QueryKey),
    Removed(QueryKey),
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Updated(key) | CacheEvent::Invalidated(key) | CacheEvent::Removed(key) => key,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// Number of `invalidate_queries` calls.
    pub invalidate_calls: u64,
    /// Number of entries marked invalid across all calls.
    pub invalidated_entries: u64,
    pub evictions: u64,
    pub entries: usize,
}

fn is_retryable(error: &AppError) -> bool {
    !matches!(
        error,
        AppError::Validation { .. } | AppError::Serialization { .. } | AppError::Configuration { .. }
    )
}

// ============================================================================
// QUERY CLIENT
// ============================================================================

pub struct QueryClient {
    entries: DashMap<QueryKey, CacheEntry>,
    /// Bumped by every invalidation covering the key. A fetch only stores a
    /// valid entry if the generation it started with is still current.
    generations: DashMap<QueryKey, u64>,
    defaults: QueryOptions,
    events: broadcast::Sender<CacheEvent>,
    stats: Mutex<CacheStats>,
    sized_resources: Mutex<HashSet<String>>,
}

impl QueryClient {
    pub fn new(defaults: QueryOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            defaults,
            events,
            stats: Mutex::new(CacheStats::default()),
            sized_resources: Mutex::new(HashSet::new()),
        }
    }

    pub fn default_options(&self) -> &QueryOptions {
        &self.defaults
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Observe cache changes. Lagging receivers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Read cached data regardless of staleness.
    pub fn get_query_data<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entry = self.entries.get_mut(key)?;
        entry.last_accessed = Instant::now();
        let data = entry.data.downcast_ref::<T>().cloned();
        data
    }

    /// Every entry under `prefix` holding a `T`.
    pub fn get_queries_data<T>(&self, prefix: &QueryKey) -> Vec<(QueryKey, T)>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .filter_map(|entry| {
                entry
                    .value()
                    .data
                    .downcast_ref::<T>()
                    .map(|data| (entry.key().clone(), data.clone()))
            })
            .collect()
    }

    /// Write data as a fresh entry, replacing whatever was there.
    pub fn set_query_data<T>(&self, key: QueryKey, data: T)
    where
        T: Send + Sync + 'static,
    {
        self.store(key, Arc::new(data), self.defaults.gc_time, false);
    }

    pub fn query_state(&self, key: &QueryKey) -> Option<QueryState> {
        self.entries.get(key).map(|entry| QueryState {
            updated_at: entry.updated_at,
            is_invalidated: entry.invalidated,
        })
    }

    /// Mark every entry whose key starts with `prefix` as invalid.
    ///
    /// Invalid entries stay readable through `get_query_data` but the next
    /// `fetch_query` goes to the network. Fetches already in flight under the
    /// prefix store their result as invalid.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        for mut generation in self.generations.iter_mut() {
            if generation.key().starts_with(prefix) {
                *generation.value_mut() += 1;
            }
        }

        let mut invalidated = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.key().starts_with(prefix) {
                entry.invalidated = true;
                invalidated.push(entry.key().clone());
            }
        }

        let count = invalidated.len();
        {
            let mut stats = self.stats.lock();
            stats.invalidate_calls += 1;
            stats.invalidated_entries += count as u64;
        }
        metrics::record_invalidations(prefix.resource().unwrap_or("unknown"), count);
        info!("♻️ Invalidated {} cached queries under {}", count, prefix);

        for key in invalidated {
            // No receivers is fine
            let _ = self.events.send(CacheEvent::Invalidated(key));
        }
        count
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn remove_queries(&self, prefix: &QueryKey) -> usize {
        let keys: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        for key in &keys {
            self.entries.remove(key);
            self.generations.remove(key);
        }
        debug!("🗑️ Removed {} cached queries under {}", keys.len(), prefix);
        for key in keys.iter().cloned() {
            let _ = self.events.send(CacheEvent::Removed(key));
        }
        self.refresh_size_gauge();
        keys.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.generations.clear();
        self.refresh_size_gauge();
        info!("🧹 Query cache cleared");
    }

    /// Return cached data when fresh, otherwise run `fetcher` and cache its
    /// result. Failed attempts are retried `options.retry` times with
    /// exponential backoff; errors are never cached.
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: QueryKey,
        options: &QueryOptions,
        fetcher: F,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let resource = key.resource().unwrap_or("unknown").to_string();

        if let Some(data) = self.fresh_data::<T>(&key, options.stale_time) {
            debug!("🎯 Query cache hit for key: {}", key);
            self.update_stats(true);
            metrics::record_cache_access(&resource, true);
            return Ok(data);
        }

        debug!("Query cache miss for key: {}", key);
        self.update_stats(false);
        metrics::record_cache_access(&resource, false);

        let generation = *self.generations.entry(key.clone()).or_insert(0);
        let started = Instant::now();
        let mut retries = 0u32;
        loop {
            match fetcher().await {
                Ok(data) => {
                    self.store_fetched(key, Arc::new(data.clone()), options.gc_time, generation);
                    metrics::record_fetch(&resource, started.elapsed().as_secs_f64(), retries);
                    return Ok(data);
                }
                Err(e) if retries < options.retry && is_retryable(&e) => {
                    retries += 1;
                    let delay = options.backoff(retries);
                    warn!(
                        "⚠️ Fetch for {} failed (attempt {}/{}), retrying in {:?}: {}",
                        key,
                        retries,
                        options.retry + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    metrics::record_fetch(&resource, started.elapsed().as_secs_f64(), retries);
                    return Err(e);
                }
            }
        }
    }

    /// Evict entries nobody has read for longer than their gc time.
    pub fn collect_garbage(&self) -> usize {
        let before_count = self.entries.len();
        self.entries
            .retain(|_, entry| entry.last_accessed.elapsed() < entry.gc_time);
        let removed = before_count.saturating_sub(self.entries.len());
        self.generations
            .retain(|key, _| self.entries.contains_key(key));

        if removed > 0 {
            self.stats.lock().evictions += removed as u64;
            self.refresh_size_gauge();
            debug!("🧹 Query cache GC: removed {} idle entries", removed);
        }
        removed
    }

    /// Start background garbage collection. The task ends once the client
    /// has been dropped. Intervals below 100ms are raised to 100ms.
    pub fn start_garbage_collection(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        if every < MIN_GC_INTERVAL {
            warn!(
                "⚠️ Query cache GC interval {:?} too short, using {:?}",
                every, MIN_GC_INTERVAL
            );
        }
        let every = every.max(MIN_GC_INTERVAL);
        let client: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut cleanup_interval = interval(every);
            info!("🔄 Started query cache GC task (interval: {:?})", every);

            loop {
                cleanup_interval.tick().await;
                match client.upgrade() {
                    Some(client) => {
                        client.collect_garbage();
                    }
                    None => break,
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        stats.entries = self.entries.len();
        stats
    }

    fn fresh_data<T>(&self, key: &QueryKey, stale_time: Duration) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entry = self.entries.get_mut(key)?;
        if !entry.is_fresh(stale_time) {
            return None;
        }
        let data = entry.data.downcast_ref::<T>().cloned()?;
        entry.last_accessed = Instant::now();
        Some(data)
    }

    fn store(&self, key: QueryKey, data: Arc<dyn Any + Send + Sync>, gc_time: Duration, invalidated: bool) {
        self.entries
            .insert(key.clone(), CacheEntry::new(data, gc_time, invalidated));
        self.refresh_size_gauge();
        let _ = self.events.send(CacheEvent::Updated(key));
    }

    /// Store a fetch result, marked invalid if an invalidation covered the
    /// key after the fetch started. The generation guard is held across the
    /// insert so a concurrent invalidation either sees the new entry or
    /// bumps the generation first.
    fn store_fetched(
        &self,
        key: QueryKey,
        data: Arc<dyn Any + Send + Sync>,
        gc_time: Duration,
        started_at: u64,
    ) {
        let current = self.generations.get(&key);
        let superseded = current.as_deref() != Some(&started_at);
        if superseded {
            debug!("Fetch for {} overlapped an invalidation, storing as stale", key);
        }
        self.entries
            .insert(key.clone(), CacheEntry::new(data, gc_time, superseded));
        drop(current);

        self.refresh_size_gauge();
        let _ = self.events.send(CacheEvent::Updated(key));
    }

    fn update_stats(&self, hit: bool) {
        let mut stats = self.stats.lock();
        if hit {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        let total = stats.hits + stats.misses;
        stats.hit_rate = if total > 0 { stats.hits as f64 / total as f64 } else { 0.0 };
    }

    fn refresh_size_gauge(&self) {
        let mut sizes: HashMap<String, i64> = HashMap::new();
        for entry in self.entries.iter() {
            let resource = entry.key().resource().unwrap_or("unknown");
            *sizes.entry(resource.to_string()).or_insert(0) += 1;
        }
        let mut sized = self.sized_resources.lock();
        for resource in sized.iter() {
            if !sizes.contains_key(resource) {
                metrics::update_cache_size(resource, 0);
            }
        }
        for (resource, size) in sizes {
            metrics::update_cache_size(&resource, size);
            sized.insert(resource);
        }
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(QueryOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options() -> QueryOptions {
        QueryOptions::new(60, 300, 2).with_retry_delay(Duration::ZERO)
    }

    fn key(resource: &str, id: i64) -> QueryKey {
        QueryKey::new(resource).with("single").with(id)
    }

    #[test]
    fn test_set_and_get_query_data() {
        let client = QueryClient::default();
        client.set_query_data(key("users", 1), "ada".to_string());

        assert_eq!(client.get_query_data::<String>(&key("users", 1)), Some("ada".to_string()));
        // wrong type reads as a miss
        assert_eq!(client.get_query_data::<i32>(&key("users", 1)), None);
        assert_eq!(client.get_query_data::<String>(&key("users", 2)), None);
    }

    #[test]
    fn test_invalidate_marks_only_prefixed_entries() {
        let client = QueryClient::default();
        client.set_query_data(key("users", 1), 1);
        client.set_query_data(QueryKey::new("users").with("paged").with(1), 2);
        client.set_query_data(key("logs", 1), 3);

        let count = client.invalidate_queries(&QueryKey::new("users"));
        assert_eq!(count, 2);
        assert!(client.query_state(&key("users", 1)).unwrap().is_invalidated);
        assert!(!client.query_state(&key("logs", 1)).unwrap().is_invalidated);

        // invalid entries remain readable
        assert_eq!(client.get_query_data::<i32>(&key("users", 1)), Some(1));

        let stats = client.stats();
        assert_eq!(stats.invalidate_calls, 1);
        assert_eq!(stats.invalidated_entries, 2);
    }

    #[tokio::test]
    async fn test_fetch_query_hits_cache_until_invalidated() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>(vec![1, 2, 3])
            }
        };

        let first = client.fetch_query(key("logs", 1), &options(), fetch).await.unwrap();
        let second = client.fetch_query(key("logs", 1), &options(), fetch).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.invalidate_queries(&QueryKey::new("logs"));
        client.fetch_query(key("logs", 1), &options(), fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!client.query_state(&key("logs", 1)).unwrap().is_invalidated);

        let stats = client.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_zero_stale_time_always_refetches() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = QueryOptions::new(0, 300, 0);
        for _ in 0..3 {
            let calls = calls.clone();
            client
                .fetch_query(key("health", 1), &opts, move || {
                    let calls = calls.clone();
                    async move { Ok::<_, AppError>(calls.fetch_add(1, Ordering::SeqCst)) }
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_retries_then_succeeds() {
        let client = QueryClient::default();
        let attempts = Arc::new(AtomicUsize::new(0));
        let result = client
            .fetch_query(key("users", 9), &options(), || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AppError::server_side(503, "Service Unavailable"))
                    } else {
                        Ok(9)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(9));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_errors_are_not_cached_and_validation_is_not_retried() {
        let client = QueryClient::default();
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: Result<i32> = client
            .fetch_query(key("users", 3), &options(), || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::validation("id: must be positive"))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(!client.contains(&key("users", 3)));
    }

    #[test]
    fn test_remove_and_collect_garbage() {
        let client = QueryClient::new(QueryOptions::new(60, 0, 0));
        client.set_query_data(key("users", 1), 1);
        client.set_query_data(key("logs", 1), 1);

        assert_eq!(client.remove_queries(&QueryKey::new("users")), 1);
        assert_eq!(client.len(), 1);

        // gc time of zero means anything idle is collectable
        assert_eq!(client.collect_garbage(), 1);
        assert!(client.is_empty());
        assert_eq!(client.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_invalidation_events_are_published() {
        let client = QueryClient::default();
        let mut events = client.subscribe();
        client.set_query_data(key("users", 1), 1);
        client.invalidate_queries(&QueryKey::new("users"));

        assert_eq!(events.recv().await.unwrap(), CacheEvent::Updated(key("users", 1)));
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Invalidated(key("users", 1)));
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_forces_refetch() {
        let client = Arc::new(QueryClient::default());
        let list_key = QueryKey::new("users").with("paged").with(1);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let started_tx = Arc::new(Mutex::new(Some(started_tx)));
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));

        let in_flight = {
            let client = client.clone();
            let list_key = list_key.clone();
            tokio::spawn(async move {
                client
                    .fetch_query(list_key, &options(), move || {
                        let started = started_tx.lock().take();
                        let release = release_rx.lock().take();
                        async move {
                            if let Some(started) = started {
                                let _ = started.send(());
                            }
                            if let Some(release) = release {
                                let _ = release.await;
                            }
                            Ok::<_, AppError>("pre-mutation".to_string())
                        }
                    })
                    .await
            })
        };

        // 1. fetch is waiting on the server
        started_rx.await.unwrap();
        // 2. a mutation settles while the response is still in flight
        client.invalidate_queries(&QueryKey::new("users"));
        // 3. the old response arrives
        release_tx.send(()).unwrap();
        assert_eq!(in_flight.await.unwrap().unwrap(), "pre-mutation");

        assert!(
            client.query_state(&list_key).unwrap().is_invalidated,
            "Response from before the invalidation must not be fresh"
        );
        let next = client
            .fetch_query(list_key.clone(), &options(), || async {
                Ok::<_, AppError>("post-mutation".to_string())
            })
            .await
            .unwrap();
        assert_eq!(next, "post-mutation");
        assert!(!client.query_state(&list_key).unwrap().is_invalidated);
    }

    #[tokio::test]
    async fn test_remove_during_fetch_stores_stale_entry() {
        let client = Arc::new(QueryClient::default());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let started_tx = Arc::new(Mutex::new(Some(started_tx)));
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));

        let in_flight = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .fetch_query(key("logs", 4), &options(), move || {
                        let started = started_tx.lock().take();
                        let release = release_rx.lock().take();
                        async move {
                            if let Some(started) = started {
                                let _ = started.send(());
                            }
                            if let Some(release) = release {
                                let _ = release.await;
                            }
                            Ok::<_, AppError>(4)
                        }
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        client.remove_queries(&QueryKey::new("logs"));
        release_tx.send(()).unwrap();
        in_flight.await.unwrap().unwrap();

        assert!(client.query_state(&key("logs", 4)).unwrap().is_invalidated);
    }

    #[test]
    fn test_cache_size_gauge_is_per_resource() {
        let client = QueryClient::default();
        client.set_query_data(key("gaugeusers", 1), 1);
        client.set_query_data(key("gaugeusers", 2), 2);
        client.set_query_data(key("gaugelogs", 1), 1);

        let size = |resource: &str| metrics::QUERY_CACHE_SIZE.with_label_values(&[resource]).get();
        assert_eq!(size("gaugeusers"), 2);
        assert_eq!(size("gaugelogs"), 1);

        client.remove_queries(&QueryKey::new("gaugelogs"));
        assert_eq!(size("gaugelogs"), 0);
        assert_eq!(size("gaugeusers"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_gc_interval_is_raised_instead_of_panicking() {
        let client = Arc::new(QueryClient::new(QueryOptions::new(60, 0, 0)));
        client.set_query_data(key("users", 1), 1);
        let handle = client.start_garbage_collection(Duration::ZERO);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_finished(), "GC task should still be running");
        assert!(client.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_gc_task_stops_when_client_dropped() {
        let client = Arc::new(QueryClient::new(QueryOptions::new(60, 0, 0)));
        client.set_query_data(key("users", 1), 1);
        let handle = client.start_garbage_collection(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(client.is_empty());

        drop(client);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("gc task should end")
            .unwrap();
    }
}
