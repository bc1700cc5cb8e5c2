//! Endpoint construction.

use std::future::Future;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{BoundedCache, Cache, CacheStore, DEFAULT_EVICTION_TIMEOUT};
use crate::endpoint::core::{Endpoint, EndpointInner};
use crate::endpoint::hooks::Hooks;
use crate::endpoint::loader::{HttpLoader, Loader};
use crate::endpoint::validator::{CacheValidator, ValidationContext};
use crate::error::RequestError;
use crate::keys::{HeaderTemplate, HeaderValue, KeyDeriver, UrlTemplate};
use crate::mock::MockStack;
use crate::resilience::{ErrorEmitter, ResolutionPolicy};
use crate::transport::{Method, ReqwestTransport, Transport};

/// Configures an endpoint of verb type `V`.
///
/// Defaults: GET endpoints cache, other verbs do not; POST and PUT declare
/// `Content-Type: application/json`; fetches go through a [`HttpLoader`]
/// over the global error emitter.
pub struct EndpointBuilder<K, B, T, V> {
    method: Method,
    url: UrlTemplate<K>,
    headers: HeaderTemplate<K>,
    cache_request: bool,
    cache: Option<Arc<dyn Cache<T>>>,
    max_entries: Option<NonZeroUsize>,
    validator: Option<CacheValidator<K, T>>,
    loader: Option<Box<dyn Loader<K, B, T>>>,
    transport: Option<Arc<dyn Transport>>,
    emitter: Option<Arc<ErrorEmitter>>,
    policy: ResolutionPolicy,
    hooks: Hooks<T>,
    eviction_timeout: Duration,
    _verb: PhantomData<fn() -> V>,
}

impl<K, B, T, V> EndpointBuilder<K, B, T, V>
where
    K: Clone + Send + Sync + 'static,
    B: Serialize + Send + Sync + 'static,
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    V: From<Endpoint<K, B, T>>,
{
    pub(crate) fn new(method: Method, url: UrlTemplate<K>) -> Self {
        let mut headers = HeaderTemplate::new();
        if method.sends_body() {
            headers.insert("Content-Type", HeaderValue::from("application/json"));
        }
        Self {
            method,
            url,
            headers,
            cache_request: method.caches_by_default(),
            cache: None,
            max_entries: None,
            validator: None,
            loader: None,
            transport: None,
            emitter: None,
            policy: ResolutionPolicy::default(),
            hooks: Hooks::default(),
            eviction_timeout: DEFAULT_EVICTION_TIMEOUT,
            _verb: PhantomData,
        }
    }

    /// Declare a fixed header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, HeaderValue::Literal(value.into()));
        self
    }

    /// Declare a header computed from the keys of each call.
    pub fn header_with<F>(mut self, name: impl Into<String>, value: F) -> Self
    where
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        self.headers.insert(name, HeaderValue::derived(value));
        self
    }

    /// Declare a computed header whose derivation may fail the call.
    pub fn try_header_with<F, E>(mut self, name: impl Into<String>, value: F) -> Self
    where
        F: Fn(&K) -> Result<String, E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        self.headers.insert(name, HeaderValue::try_derived(value));
        self
    }

    pub fn cache_request(mut self, enabled: bool) -> Self {
        self.cache_request = enabled;
        self
    }

    /// Use custom storage instead of the default in-memory map.
    pub fn cache(mut self, cache: Arc<dyn Cache<T>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Bound the default storage to `max_entries` (LRU).
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = NonZeroUsize::new(max_entries);
        self
    }

    pub fn cache_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&ValidationContext<'_, K, T>) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Install a prepared validator such as [`upstream`](super::validator::upstream).
    pub fn validator(mut self, validator: CacheValidator<K, T>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace the default HTTP loader.
    pub fn loader<L>(mut self, loader: L) -> Self
    where
        L: Loader<K, B, T> + 'static,
    {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn error_emitter(mut self, emitter: Arc<ErrorEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn resolution_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn eviction_timeout(mut self, timeout: Duration) -> Self {
        self.eviction_timeout = timeout;
        self
    }

    /// Run `hook` after every successful fetch.
    pub fn after_success<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.after_success = Some(Arc::new(move |value: &T| hook(value).boxed()));
        self
    }

    /// Run `hook` after every failed fetch.
    pub fn after_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.after_error = Some(Arc::new(move |error: &RequestError| hook(error).boxed()));
        self
    }

    pub fn build(self) -> V {
        let deriver = Arc::new(KeyDeriver::new(self.url, self.headers));
        let cache = self.cache.or_else(|| {
            self.max_entries
                .map(|max| Arc::new(BoundedCache::new(max)) as Arc<dyn Cache<T>>)
        });
        let store = Arc::new(CacheStore::new(deriver, cache, self.eviction_timeout));

        let loader: Box<dyn Loader<K, B, T>> = match self.loader {
            Some(loader) => loader,
            None => {
                let transport = self
                    .transport
                    .unwrap_or_else(|| Arc::new(ReqwestTransport::with_client(reqwest::Client::new())));
                let emitter = self.emitter.unwrap_or_else(ErrorEmitter::global);
                Box::new(HttpLoader::new(transport, emitter, self.policy))
            }
        };

        tracing::debug!(
            method = %self.method,
            cache_request = self.cache_request,
            "Endpoint created"
        );

        V::from(Endpoint::from_parts(EndpointInner {
            method: self.method,
            store,
            cache_request: self.cache_request,
            validator: self.validator,
            loader: ArcSwap::from_pointee(loader),
            hooks: self.hooks,
            mocks: Mutex::new(MockStack::default()),
        }))
    }
}
