//! Pluggable entry storage.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use dashmap::DashMap;
use lru::LruCache;

use crate::future::RequestFuture;
use crate::lock::lock;

/// String-keyed storage for in-flight and settled request futures.
pub trait Cache<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<RequestFuture<T>>;
    fn set(&self, key: String, value: RequestFuture<T>);
    fn delete(&self, key: &str);
    fn clear(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded concurrent map. The default storage.
pub struct MemoryCache<T> {
    entries: DashMap<String, RequestFuture<T>>,
}

impl<T> MemoryCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Cache<T> for MemoryCache<T> {
    fn get(&self, key: &str) -> Option<RequestFuture<T>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: String, value: RequestFuture<T>) {
        self.entries.insert(key, value);
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Size-bounded storage evicting the least recently used entry.
pub struct BoundedCache<T> {
    entries: Mutex<LruCache<String, RequestFuture<T>>>,
}

impl<T> BoundedCache<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        lock(&self.entries, "bounded_cache.capacity").cap().get()
    }
}

impl<T: Send + Sync + 'static> Cache<T> for BoundedCache<T> {
    fn get(&self, key: &str) -> Option<RequestFuture<T>> {
        lock(&self.entries, "bounded_cache.get").get(key).cloned()
    }

    fn set(&self, key: String, value: RequestFuture<T>) {
        if let Some((evicted, _)) = lock(&self.entries, "bounded_cache.set").push(key.clone(), value) {
            if evicted != key {
                tracing::trace!(key = %evicted, "Bounded cache dropped least recently used entry");
            }
        }
    }

    fn delete(&self, key: &str) {
        lock(&self.entries, "bounded_cache.delete").pop(key);
    }

    fn clear(&self) {
        lock(&self.entries, "bounded_cache.clear").clear();
    }

    fn len(&self) -> usize {
        lock(&self.entries, "bounded_cache.len").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::settled;

    #[tokio::test]
    async fn test_memory_cache_operations() {
        let cache: MemoryCache<u32> = MemoryCache::new();
        assert!(cache.get("a").is_none());

        cache.set("a".to_string(), settled(Ok(1)));
        cache.set("b".to_string(), settled(Ok(2)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().await.unwrap(), 1);

        cache.delete("a");
        assert!(cache.get("a").is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_cache_evicts_lru() {
        let cache: BoundedCache<u32> = BoundedCache::new(NonZeroUsize::new(2).unwrap());
        cache.set("a".to_string(), settled(Ok(1)));
        cache.set("b".to_string(), settled(Ok(2)));

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        cache.set("c".to_string(), settled(Ok(3)));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("c").unwrap().await.unwrap(), 3);
        assert_eq!(cache.capacity(), 2);
    }
}
