//! Endpoint invocation.
//!
//! # Responsibilities
//! - Derive URL, headers and cache key for each call
//! - Deduplicate concurrent calls through the cache store
//! - Start fetches eagerly through the current loader
//! - Expose the cache-management surface (refresh, retention, listeners)

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use futures_util::future::FutureExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{CacheEvent, CacheGeneration, CacheStore, GenerationCell, Invalidation, Retention};
use crate::emitter::{ListenerId, Subscription};
use crate::endpoint::hooks::Hooks;
use crate::endpoint::loader::{LoadRequest, Loader, SharedLoader};
use crate::endpoint::validator::{CacheValidator, ValidationContext};
use crate::error::RequestResult;
use crate::future::{settled, spawn_eager, RequestFuture};
use crate::keys::DerivedRequest;
use crate::mock::MockStack;
use crate::observability::metrics;
use crate::transport::Method;

pub(crate) struct EndpointInner<K, B, T> {
    pub(crate) method: Method,
    pub(crate) store: Arc<CacheStore<K, T>>,
    pub(crate) cache_request: bool,
    pub(crate) validator: Option<CacheValidator<K, T>>,
    pub(crate) loader: ArcSwap<Box<dyn Loader<K, B, T>>>,
    pub(crate) hooks: Hooks<T>,
    pub(crate) mocks: Mutex<MockStack<K, B, T>>,
}

/// A callable request description with its own cache.
///
/// Cloning is cheap and shares the cache, loader and listeners.
pub struct Endpoint<K, B, T> {
    pub(crate) inner: Arc<EndpointInner<K, B, T>>,
}

impl<K, B, T> Clone for Endpoint<K, B, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct WeakEndpoint<K, B, T> {
    inner: Weak<EndpointInner<K, B, T>>,
}

impl<K, B, T> WeakEndpoint<K, B, T> {
    pub(crate) fn upgrade(&self) -> Option<Endpoint<K, B, T>> {
        self.inner.upgrade().map(|inner| Endpoint { inner })
    }
}

impl<K, B, T> Endpoint<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(inner: EndpointInner<K, B, T>) -> Self {
        Self { inner: Arc::new(inner) }
    }

    pub(crate) fn downgrade(&self) -> WeakEndpoint<K, B, T> {
        WeakEndpoint {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Call the endpoint.
    ///
    /// Concurrent calls with the same cache key share one fetch. Derivation
    /// failures settle immediately and are never cached.
    pub fn invoke(&self, keys: K, body: Option<B>) -> RequestFuture<T> {
        let derived = match self.inner.store.deriver().derive(&keys) {
            Ok(derived) => derived,
            Err(e) => {
                tracing::debug!(method = %self.inner.method, error = %e, "Request derivation failed");
                return settled(Err(e));
            }
        };

        if !self.inner.cache_request {
            return self.start_fetch(keys, derived, body);
        }

        let use_cache = match &self.inner.validator {
            Some(validator) => validator(&ValidationContext {
                keys: &keys,
                url: &derived.url,
                headers: &derived.headers,
                cache_key: &derived.cache_key,
                store: &self.inner.store,
            }),
            None => true,
        };

        let cache_key = derived.cache_key.clone();
        if !use_cache {
            tracing::debug!(cache_key = %cache_key, "Cache validator rejected cached entry");
            metrics::record_cache_lookup(false);
            let fresh = self.start_fetch(keys, derived, body);
            self.inner.store.set(cache_key, fresh.clone());
            return fresh;
        }

        let (future, hit) = self
            .inner
            .store
            .get_or_insert_with(&cache_key, || self.start_fetch(keys, derived, body));
        metrics::record_cache_lookup(hit);
        tracing::debug!(cache_key = %cache_key, hit, "Cache lookup");
        future
    }

    fn start_fetch(&self, keys: K, derived: DerivedRequest, body: Option<B>) -> RequestFuture<T> {
        let loader = self.inner.loader.load_full();
        let hooks = self.inner.hooks.clone();
        let method = self.inner.method;
        let span = tracing::debug_span!(
            "request",
            request_id = %Uuid::new_v4(),
            method = %method,
            url = %derived.url,
        );
        let request = LoadRequest {
            method,
            keys,
            url: derived.url,
            headers: derived.headers,
            body,
        };

        let fetch = async move {
            let started = Instant::now();
            let result = loader.load(request).await;
            metrics::record_fetch(method, result.as_ref().err(), started.elapsed());
            match &result {
                Ok(_) => tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Fetch completed"),
                Err(e) => tracing::debug!(error = %e, kind = e.kind(), "Fetch failed"),
            }
            hooks.run(&result).await;
            result
        }
        .instrument(span);

        spawn_eager(fetch)
            .map(|joined| joined.and_then(|result| result))
            .boxed()
            .shared()
    }

    pub fn method(&self) -> Method {
        self.inner.method
    }

    /// Whether calls go through the cache.
    pub fn is_caching(&self) -> bool {
        self.inner.cache_request
    }

    /// The cache key a call with `keys` would use.
    pub fn cache_key(&self, keys: &K) -> RequestResult<String> {
        self.inner.store.cache_key_for(keys)
    }

    /// Drop all cached data and notify listeners.
    pub fn refresh(&self) -> Invalidation {
        self.inner.store.invalidate()
    }

    pub fn clear_cache(&self) -> Invalidation {
        self.refresh()
    }

    /// Keep the entry for `keys` cached while the returned guard is held.
    pub fn keep_in_cache(&self, keys: &K) -> RequestResult<Retention> {
        self.keep_in_cache_for(keys, self.inner.store.eviction_timeout())
    }

    pub fn keep_in_cache_for(&self, keys: &K, timeout: Duration) -> RequestResult<Retention> {
        if !self.inner.cache_request {
            return self.cache_key(keys).map(Retention::detached);
        }
        self.inner.store.acquire_for(keys, timeout)
    }

    pub fn on<F, Fut>(&self, event: CacheEvent, listener: F) -> Subscription
    where
        F: Fn(CacheGeneration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.store.on(event, listener)
    }

    pub fn off(&self, event: CacheEvent, id: Option<ListenerId>) {
        self.inner.store.off(event, id)
    }

    pub fn generation(&self) -> Option<CacheGeneration> {
        self.inner.store.generation()
    }

    /// Shared view of this endpoint's generation, for upstream validators.
    pub fn generation_cell(&self) -> GenerationCell {
        self.inner.store.generation_cell()
    }

    pub fn cache_store(&self) -> &Arc<CacheStore<K, T>> {
        &self.inner.store
    }

    /// The loader currently serving fetches.
    pub fn loader(&self) -> SharedLoader<K, B, T> {
        self.inner.loader.load_full()
    }

    pub fn set_loader<L>(&self, loader: L)
    where
        L: Loader<K, B, T> + 'static,
    {
        self.inner.loader.store(Arc::new(Box::new(loader)));
    }

    /// Install `loader`, returning the one it replaced.
    pub fn replace_loader(&self, loader: SharedLoader<K, B, T>) -> SharedLoader<K, B, T> {
        self.inner.loader.swap(loader)
    }
}

impl<K, B, T> std::fmt::Debug for Endpoint<K, B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.inner.method)
            .field("cache_request", &self.inner.cache_request)
            .finish()
    }
}
