//! Per-endpoint cache store.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::cache::generation::{CacheGeneration, GenerationCell};
use crate::cache::retention::{Retention, RetentionTracker};
use crate::cache::storage::{Cache, MemoryCache};
use crate::emitter::{Emitter, ListenerId, Subscription};
use crate::error::RequestResult;
use crate::future::{spawn_eager, RequestFuture};
use crate::keys::KeyDeriver;
use crate::lock::lock;
use crate::observability::metrics;

/// Default delay between the last release of a key and its eviction.
pub const DEFAULT_EVICTION_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Events a store broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEvent {
    /// The store was invalidated; carries the generation that was dropped.
    CacheClear,
}

/// Reaction to an invalidation, spawned when the store is cleared.
pub type ClearListener = dyn Fn(CacheGeneration) -> BoxFuture<'static, ()> + Send + Sync;

/// Resolves to the number of listeners notified, once all reactions settled.
pub type Invalidation = BoxFuture<'static, usize>;

/// Cache entries, consumer registrations, generation and clear listeners of
/// one endpoint.
pub struct CacheStore<K, T> {
    deriver: Arc<KeyDeriver<K>>,
    cache: Arc<dyn Cache<T>>,
    retention: Arc<RetentionTracker<T>>,
    generation: GenerationCell,
    listeners: Arc<Emitter<ClearListener>>,
    fetch_lock: Mutex<()>,
    eviction_timeout: Duration,
}

impl<K, T> CacheStore<K, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a store over `cache`, defaulting to an unbounded [`MemoryCache`].
    pub fn new(deriver: Arc<KeyDeriver<K>>, cache: Option<Arc<dyn Cache<T>>>, eviction_timeout: Duration) -> Self {
        let cache = cache.unwrap_or_else(|| Arc::new(MemoryCache::new()));
        Self {
            deriver,
            retention: RetentionTracker::new(cache.clone()),
            cache,
            generation: GenerationCell::new(),
            listeners: Arc::new(Emitter::new()),
            fetch_lock: Mutex::new(()),
            eviction_timeout,
        }
    }

    pub fn get(&self, key: &str) -> Option<RequestFuture<T>> {
        self.cache.get(key)
    }

    /// Store an entry, stamping a generation on the first write after a clear.
    pub fn set(&self, key: String, value: RequestFuture<T>) {
        self.cache.set(key, value);
        if let Some(generation) = self.generation.stamp_if_empty() {
            tracing::trace!(epoch = generation.epoch, "New cache generation");
        }
    }

    pub fn delete(&self, key: &str) {
        self.cache.delete(key);
    }

    /// Drop every entry and idle registration without broadcasting.
    pub fn clear(&self) {
        self.cache.clear();
        self.retention.clear();
    }

    /// Look up `key`, inserting the future built by `start` on a miss.
    ///
    /// Lookup and insert happen under one lock, so concurrent misses for the
    /// same key start exactly one fetch. Returns whether it was a hit.
    pub(crate) fn get_or_insert_with<F>(&self, key: &str, start: F) -> (RequestFuture<T>, bool)
    where
        F: FnOnce() -> RequestFuture<T>,
    {
        let _guard = lock(&self.fetch_lock, "store.get_or_insert");
        if let Some(existing) = self.cache.get(key) {
            return (existing, true);
        }
        let fresh = start();
        self.set(key.to_string(), fresh.clone());
        (fresh, false)
    }

    /// The cache key `keys` would use. Does not touch storage.
    pub fn cache_key_for(&self, keys: &K) -> RequestResult<String> {
        self.deriver.cache_key(keys)
    }

    pub fn deriver(&self) -> &Arc<KeyDeriver<K>> {
        &self.deriver
    }

    pub fn generation(&self) -> Option<CacheGeneration> {
        self.generation.get()
    }

    /// A shared view of this store's generation.
    pub fn generation_cell(&self) -> GenerationCell {
        self.generation.clone()
    }

    pub fn eviction_timeout(&self) -> Duration {
        self.eviction_timeout
    }

    /// Clear the store and notify clear listeners.
    ///
    /// Clearing and notification happen immediately; the returned future
    /// only waits for the listeners' reactions. Without cached data this is
    /// a no-op.
    pub fn invalidate(&self) -> Invalidation {
        let previous = {
            let _guard = lock(&self.fetch_lock, "store.invalidate");
            let Some(previous) = self.generation.take() else {
                return future::ready(0).boxed();
            };
            self.clear();
            previous
        };

        let listeners = self.listeners.snapshot();
        metrics::record_invalidation();
        tracing::debug!(
            epoch = previous.epoch,
            listeners = listeners.len(),
            "Cache invalidated"
        );

        let reactions: Vec<_> = listeners
            .into_iter()
            .filter_map(|listener| match catch_unwind(AssertUnwindSafe(|| listener(previous))) {
                Ok(reaction) => Some(spawn_eager(reaction)),
                Err(_) => {
                    tracing::warn!(epoch = previous.epoch, "Cache clear listener panicked");
                    None
                }
            })
            .collect();

        async move {
            let count = reactions.len();
            for outcome in future::join_all(reactions).await {
                if let Err(e) = outcome {
                    tracing::warn!(error = %e, "Cache clear reaction failed");
                }
            }
            count
        }
        .boxed()
    }

    /// Retain the entry for `keys` with the store's eviction timeout.
    pub fn acquire(&self, keys: &K) -> RequestResult<Retention> {
        self.acquire_for(keys, self.eviction_timeout)
    }

    /// Retain the entry for `keys`, evicting `timeout` after the last release.
    pub fn acquire_for(&self, keys: &K, timeout: Duration) -> RequestResult<Retention> {
        let key = self.cache_key_for(keys)?;
        Ok(self.retention.acquire(key, timeout))
    }

    pub fn consumer_count(&self, key: &str) -> usize {
        self.retention.consumer_count(key)
    }

    /// Subscribe to a store event.
    pub fn on<F, Fut>(&self, event: CacheEvent, listener: F) -> Subscription
    where
        F: Fn(CacheGeneration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match event {
            CacheEvent::CacheClear => self
                .listeners
                .subscribe(Arc::new(move |generation| listener(generation).boxed())),
        }
    }

    /// Remove one listener, or every listener of `event` when `id` is `None`.
    pub fn off(&self, event: CacheEvent, id: Option<ListenerId>) {
        match (event, id) {
            (CacheEvent::CacheClear, Some(id)) => {
                self.listeners.remove(id);
            }
            (CacheEvent::CacheClear, None) => self.listeners.clear(),
        }
    }

    pub fn listener_count(&self, event: CacheEvent) -> usize {
        match event {
            CacheEvent::CacheClear => self.listeners.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::settled;
    use crate::keys::{HeaderTemplate, UrlTemplate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> CacheStore<u32, String> {
        let deriver = KeyDeriver::new(UrlTemplate::new(|id: &u32| format!("/item/{}", id)), HeaderTemplate::new());
        CacheStore::new(Arc::new(deriver), None, DEFAULT_EVICTION_TIMEOUT)
    }

    fn counting_listener(store: &CacheStore<u32, String>) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        store.on(CacheEvent::CacheClear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {}
        });
        calls
    }

    #[tokio::test]
    async fn test_invalidate_without_data_is_noop() {
        let store = store();
        let calls = counting_listener(&store);

        assert_eq!(store.invalidate().await, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let store = store();
        let calls = counting_listener(&store);
        store.set("a".to_string(), settled(Ok("x".to_string())));
        assert!(store.generation().is_some());

        assert_eq!(store.invalidate().await, 1);
        assert_eq!(store.invalidate().await, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
        assert!(store.generation().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_clears_eagerly() {
        let store = store();
        store.set("a".to_string(), settled(Ok("x".to_string())));
        let calls = counting_listener(&store);

        let pending = store.invalidate();
        assert!(store.get("a").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(pending);
    }

    #[tokio::test]
    async fn test_listener_receives_previous_generation() {
        let store = store();
        store.set("a".to_string(), settled(Ok("x".to_string())));
        let stamped = store.generation().unwrap();

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        store.on(CacheEvent::CacheClear, move |generation| {
            *sink.lock().unwrap() = Some(generation);
            async {}
        });

        store.invalidate().await;
        assert_eq!(*seen.lock().unwrap(), Some(stamped));
    }

    #[tokio::test]
    async fn test_invalidation_waits_for_reactions() {
        let store = store();
        store.set("a".to_string(), settled(Ok("x".to_string())));
        let done = Arc::new(AtomicUsize::new(0));
        let flag = done.clone();
        store.on(CacheEvent::CacheClear, move |_| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                flag.fetch_add(1, Ordering::SeqCst);
            }
        });

        store.invalidate().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_block_others() {
        let store = store();
        store.set("a".to_string(), settled(Ok("x".to_string())));
        store.on(CacheEvent::CacheClear, |_| -> futures_util::future::Ready<()> { panic!("listener") });
        let calls = counting_listener(&store);

        assert_eq!(store.invalidate().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_off_removes_listeners() {
        let store = store();
        let calls = counting_listener(&store);
        let subscription = store.on(CacheEvent::CacheClear, |_| async {});
        assert_eq!(store.listener_count(CacheEvent::CacheClear), 2);

        store.off(CacheEvent::CacheClear, Some(subscription.id()));
        assert_eq!(store.listener_count(CacheEvent::CacheClear), 1);

        store.off(CacheEvent::CacheClear, None);
        store.set("a".to_string(), settled(Ok("x".to_string())));
        store.invalidate().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_or_insert_dedups() {
        let store = store();
        let starts = AtomicUsize::new(0);
        let start = || {
            starts.fetch_add(1, Ordering::SeqCst);
            settled(Ok("x".to_string()))
        };

        let (_, hit) = store.get_or_insert_with("a", start);
        assert!(!hit);
        let (value, hit) = store.get_or_insert_with("a", || settled(Ok("y".to_string())));
        assert!(hit);
        assert_eq!(value.await.unwrap(), "x");
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_clear_arms_eviction() {
        let store = store();
        let retention = store.acquire(&4).unwrap();
        let idle = store.acquire(&5).unwrap();
        drop(idle);
        let key = store.cache_key_for(&4).unwrap();
        let idle_key = store.cache_key_for(&5).unwrap();

        store.clear();
        assert_eq!(store.consumer_count(&key), 1);
        assert_eq!(store.consumer_count(&idle_key), 0);

        store.set(key.clone(), settled(Ok("x".to_string())));
        retention.release();
        assert_eq!(store.consumer_count(&key), 0);
        tokio::time::sleep(DEFAULT_EVICTION_TIMEOUT + Duration::from_millis(1)).await;
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn test_generation_tracks_entries_under_concurrent_invalidation() {
        let store = Arc::new(store());
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    store.get_or_insert_with(&format!("k{}", i % 7), || settled(Ok("x".to_string())));
                }
            })
        };
        for _ in 0..2_000 {
            drop(store.invalidate());
        }
        writer.join().unwrap();

        assert_eq!(store.generation().is_some(), !store.is_empty());
    }
}
