//! Reference-counted retention with delayed eviction.
//!
//! # Responsibilities
//! - Count consumers per cache key
//! - Arm an eviction timer when the count drops to zero
//! - Cancel the timer when a consumer re-acquires the key in time
//!
//! # Design Decisions
//! - Clearing drops idle registrations only; live holders stay registered
//!   with their count, so a release after a clear still arms eviction
//! - Each registration carries a lease number; releases from an older
//!   registration (one removed by eviction) are ignored
//! - Each armed timer carries a token; a timer that lost a race with a
//!   re-acquire and a later release cannot evict early
//! - The timer re-checks count, lease and token under the map's entry lock
//!   and deletes the cache entry while still holding it

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::cache::storage::Cache;
use crate::observability::metrics;

/// Consumer bookkeeping for one cache key.
#[derive(Debug)]
pub struct ConsumerRegistration {
    pub count: usize,
    pub lease: u64,
    token: u64,
    eviction: Option<JoinHandle<()>>,
}

impl ConsumerRegistration {
    fn new(lease: u64) -> Self {
        Self {
            count: 0,
            lease,
            token: 0,
            eviction: None,
        }
    }

    fn cancel_eviction(&mut self) {
        self.token += 1;
        if let Some(timer) = self.eviction.take() {
            timer.abort();
        }
    }

    pub fn eviction_pending(&self) -> bool {
        self.eviction.is_some()
    }
}

trait Release: Send + Sync {
    fn release(&self, key: &str, lease: u64, timeout: Duration);
}

pub(crate) struct RetentionTracker<T> {
    registrations: DashMap<String, ConsumerRegistration>,
    cache: Arc<dyn Cache<T>>,
    next_lease: AtomicU64,
    me: Weak<Self>,
}

impl<T: Send + Sync + 'static> RetentionTracker<T> {
    pub(crate) fn new(cache: Arc<dyn Cache<T>>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            registrations: DashMap::new(),
            cache,
            next_lease: AtomicU64::new(1),
            me: me.clone(),
        })
    }

    pub(crate) fn acquire(&self, key: String, timeout: Duration) -> Retention {
        let lease = {
            let mut registration = self
                .registrations
                .entry(key.clone())
                .or_insert_with(|| ConsumerRegistration::new(self.next_lease.fetch_add(1, Ordering::Relaxed)));
            registration.count += 1;
            registration.cancel_eviction();
            registration.lease
        };
        tracing::trace!(key = %key, lease, "Cache entry retained");

        let tracker: Weak<dyn Release> = self.me.clone();
        Retention {
            key,
            lease,
            timeout,
            released: AtomicBool::new(false),
            tracker: Some(tracker),
        }
    }

    pub(crate) fn consumer_count(&self, key: &str) -> usize {
        self.registrations.get(key).map(|r| r.count).unwrap_or(0)
    }

    pub(crate) fn eviction_pending(&self, key: &str) -> bool {
        self.registrations
            .get(key)
            .map(|r| r.eviction_pending())
            .unwrap_or(false)
    }

    /// Cancel every pending eviction and drop idle registrations.
    ///
    /// Registrations with live holders survive, so the entries those holders
    /// fetch again after the clear stay counted.
    pub(crate) fn clear(&self) {
        self.registrations.retain(|_, registration| {
            registration.cancel_eviction();
            registration.count > 0
        });
    }

    fn evict_if_idle(&self, key: &str, lease: u64, token: u64) {
        if let Entry::Occupied(entry) = self.registrations.entry(key.to_string()) {
            let registration = entry.get();
            if registration.count == 0 && registration.lease == lease && registration.token == token {
                self.cache.delete(key);
                entry.remove();
                metrics::record_eviction();
                tracing::debug!(key = %key, "Evicted unused cache entry");
            }
        }
    }
}

impl<T: Send + Sync + 'static> Release for RetentionTracker<T> {
    fn release(&self, key: &str, lease: u64, timeout: Duration) {
        let token = {
            let Some(mut registration) = self.registrations.get_mut(key) else {
                return;
            };
            if registration.lease != lease {
                return;
            }
            registration.count = registration.count.saturating_sub(1);
            if registration.count > 0 {
                return;
            }
            registration.cancel_eviction();
            let token = registration.token;

            match Handle::try_current() {
                Ok(handle) => {
                    let tracker = self.me.clone();
                    let owned_key = key.to_string();
                    registration.eviction = Some(handle.spawn(async move {
                        tokio::time::sleep(timeout).await;
                        if let Some(tracker) = tracker.upgrade() {
                            tracker.evict_if_idle(&owned_key, lease, token);
                        }
                    }));
                    tracing::trace!(key = %key, timeout_ms = timeout.as_millis() as u64, "Eviction scheduled");
                    return;
                }
                Err(_) => token,
            }
        };
        self.evict_if_idle(key, lease, token);
    }
}

/// Keeps a cache entry alive while held.
///
/// Releasing is one-shot; dropping the guard releases it if that has not
/// happened yet.
pub struct Retention {
    key: String,
    lease: u64,
    timeout: Duration,
    released: AtomicBool,
    tracker: Option<Weak<dyn Release>>,
}

impl Retention {
    /// A retention that keeps nothing alive, for endpoints without a cache.
    pub fn detached(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            lease: 0,
            timeout: Duration::ZERO,
            released: AtomicBool::new(true),
            tracker: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tracker) = self.tracker.as_ref().and_then(Weak::upgrade) {
            tracker.release(&self.key, self.lease, self.timeout);
        }
    }
}

impl Drop for Retention {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Retention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retention")
            .field("key", &self.key)
            .field("lease", &self.lease)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryCache;
    use crate::future::settled;

    const TIMEOUT: Duration = Duration::from_millis(20_000);

    fn tracker() -> (Arc<MemoryCache<u32>>, Arc<RetentionTracker<u32>>) {
        let cache = Arc::new(MemoryCache::new());
        cache.set("k".to_string(), settled(Ok(1)));
        let tracker = RetentionTracker::new(cache.clone() as Arc<dyn Cache<u32>>);
        (cache, tracker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_after_timeout() {
        let (cache, tracker) = tracker();
        let retention = tracker.acquire("k".to_string(), TIMEOUT);
        retention.release();
        assert!(tracker.eviction_pending("k"));

        tokio::time::sleep(Duration::from_millis(19_999)).await;
        assert!(cache.get("k").is_some());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(cache.get("k").is_none());
        assert_eq!(tracker.consumer_count("k"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacquire_cancels_eviction() {
        let (cache, tracker) = tracker();
        tracker.acquire("k".to_string(), TIMEOUT).release();

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        let held = tracker.acquire("k".to_string(), TIMEOUT);
        assert!(!tracker.eviction_pending("k"));

        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert!(cache.get("k").is_some());
        assert_eq!(tracker.consumer_count("k"), 1);
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_one_shot() {
        let (cache, tracker) = tracker();
        let first = tracker.acquire("k".to_string(), TIMEOUT);
        let second = tracker.acquire("k".to_string(), TIMEOUT);

        first.release();
        first.release();
        drop(first);
        assert_eq!(tracker.consumer_count("k"), 1);

        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert!(cache.get("k").is_some());
        drop(second);
        assert_eq!(tracker.consumer_count("k"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_reacquire_release_evicts_once() {
        let (cache, tracker) = tracker();
        tracker.acquire("k".to_string(), TIMEOUT).release();

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        let second = tracker.acquire("k".to_string(), TIMEOUT);
        tokio::time::sleep(Duration::from_millis(15_000)).await;
        assert!(cache.get("k").is_some());
        second.release();

        tokio::time::sleep(Duration::from_millis(19_999)).await;
        assert!(cache.get("k").is_some());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(cache.get("k").is_none());
        assert!(!tracker.eviction_pending("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_keeps_live_holders() {
        let (cache, tracker) = tracker();
        let held = tracker.acquire("k".to_string(), TIMEOUT);
        tracker.acquire("idle".to_string(), TIMEOUT).release();
        assert!(tracker.eviction_pending("idle"));

        tracker.clear();
        assert_eq!(tracker.consumer_count("k"), 1);
        assert!(!tracker.eviction_pending("idle"));

        let other = tracker.acquire("k".to_string(), TIMEOUT);
        assert_eq!(tracker.consumer_count("k"), 2);
        drop(other);
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert!(cache.get("k").is_some());

        held.release();
        assert!(tracker.eviction_pending("k"));
        tokio::time::sleep(Duration::from_millis(20_001)).await;
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_evicts_immediately_without_runtime() {
        let (cache, tracker) = tracker();
        tracker.acquire("k".to_string(), TIMEOUT).release();
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_detached_retention() {
        let retention = Retention::detached("k");
        assert!(retention.is_released());
        retention.release();
        assert_eq!(retention.key(), "k");
    }
}
