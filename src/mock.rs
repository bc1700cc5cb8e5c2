//! Test doubles for endpoints.
//!
//! # Responsibilities
//! - Swap an endpoint's loader for a mock and restore it afterwards
//! - Serve a mock for exactly one load
//! - Provide closure-based loaders with optional artificial latency
//! - Reusable mock definitions that can be activated, cleared and grouped
//!
//! # Design Decisions
//! - Each endpoint keeps a stack of active mocks above its base loader; the
//!   top of the stack serves loads
//! - Removing the top mock activates the next one down, or the base loader
//!   once the stack is empty; removing a buried mock only splices it out
//! - Installing or removing the serving mock clears the endpoint's storage
//!   without broadcasting, so observers are not reloaded by test setup

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::endpoint::core::{Endpoint, WeakEndpoint};
use crate::endpoint::loader::{LoadRequest, Loader, SharedLoader};
use crate::error::RequestResult;
use crate::lock::lock;

/// Mocks installed on one endpoint, oldest first.
pub(crate) struct MockStack<K, B, T> {
    base: Option<SharedLoader<K, B, T>>,
    mocks: Vec<(u64, SharedLoader<K, B, T>)>,
    next_id: u64,
}

impl<K, B, T> Default for MockStack<K, B, T> {
    fn default() -> Self {
        Self {
            base: None,
            mocks: Vec::new(),
            next_id: 0,
        }
    }
}

/// Push a mock built from its stack id and make it the serving loader.
fn push<K, B, T>(
    endpoint: &Endpoint<K, B, T>,
    make: impl FnOnce(u64) -> SharedLoader<K, B, T>,
) -> (u64, SharedLoader<K, B, T>)
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    let (id, loader) = {
        let mut stack = lock(&endpoint.inner.mocks, "mock.push");
        let id = stack.next_id;
        stack.next_id += 1;
        let loader = make(id);
        let previous = endpoint.replace_loader(loader.clone());
        if stack.mocks.is_empty() {
            stack.base = Some(previous);
        }
        stack.mocks.push((id, loader.clone()));
        (id, loader)
    };
    endpoint.cache_store().clear();
    tracing::debug!(method = %endpoint.method(), mock = id, "Endpoint mocked");
    (id, loader)
}

/// Remove every mock matching `remove`. Returns whether the serving loader
/// changed.
fn splice<K, B, T>(
    endpoint: &Endpoint<K, B, T>,
    remove: impl Fn(u64, &SharedLoader<K, B, T>) -> bool,
) -> bool
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    let changed = {
        let mut stack = lock(&endpoint.inner.mocks, "mock.splice");
        let active = match stack.mocks.last() {
            Some((id, loader)) => remove(*id, loader),
            None => return false,
        };
        stack.mocks.retain(|(id, loader)| !remove(*id, loader));
        if active {
            let next = stack.mocks.last().map(|(_, loader)| loader.clone());
            if let Some(next) = next.or_else(|| stack.base.take()) {
                endpoint.replace_loader(next);
            }
        }
        if stack.mocks.is_empty() {
            stack.base = None;
        }
        active
    };
    if changed {
        endpoint.cache_store().clear();
        tracing::debug!(method = %endpoint.method(), "Endpoint mock removed");
    }
    changed
}

/// Remove every mock from `endpoint` and put its base loader back.
pub fn unmock_all<K, B, T>(endpoint: &Endpoint<K, B, T>)
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    splice(endpoint, |_, _| true);
}

/// A closure loader with optional latency.
pub struct MockLoader<F> {
    respond: F,
    delay: Option<Duration>,
}

impl<F> MockLoader<F> {
    pub fn new(respond: F) -> Self {
        Self { respond, delay: None }
    }

    /// Wait `delay` before responding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl<K, B, T, F, Fut> Loader<K, B, T> for MockLoader<F>
where
    F: Fn(LoadRequest<K, B>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RequestResult<T>> + Send + 'static,
    K: Send + 'static,
    B: Send + 'static,
    T: Send + 'static,
{
    async fn load(&self, request: LoadRequest<K, B>) -> RequestResult<T> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(request).await
    }
}

/// Removes its mock from the endpoint when restored or dropped.
#[must_use = "dropping the guard removes the mock"]
pub struct MockGuard<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    endpoint: Endpoint<K, B, T>,
    id: u64,
}

impl<K, B, T> MockGuard<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Remove the mock now.
    pub fn restore(self) {
        drop(self);
    }
}

impl<K, B, T> Drop for MockGuard<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let id = self.id;
        splice(&self.endpoint, |candidate, _| candidate == id);
    }
}

/// Serve every load of `endpoint` from `loader` until the guard is dropped.
pub fn mock_endpoint<K, B, T, L>(endpoint: &Endpoint<K, B, T>, loader: L) -> MockGuard<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    L: Loader<K, B, T> + 'static,
{
    let loader: SharedLoader<K, B, T> = Arc::new(Box::new(loader));
    let (id, _) = push(endpoint, |_| loader);
    MockGuard {
        endpoint: endpoint.clone(),
        id,
    }
}

struct OnceLoader<L, K, B, T> {
    inner: L,
    endpoint: WeakEndpoint<K, B, T>,
    id: u64,
    used: AtomicBool,
}

#[async_trait]
impl<K, B, T, L> Loader<K, B, T> for OnceLoader<L, K, B, T>
where
    L: Loader<K, B, T> + 'static,
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    async fn load(&self, request: LoadRequest<K, B>) -> RequestResult<T> {
        if !self.used.swap(true, Ordering::SeqCst) {
            if let Some(endpoint) = self.endpoint.upgrade() {
                let id = self.id;
                splice(&endpoint, |candidate, _| candidate == id);
            }
        }
        self.inner.load(request).await
    }
}

/// Serve exactly one load from `loader`, then fall back to whatever served
/// before it.
pub fn mock_endpoint_once<K, B, T, L>(endpoint: &Endpoint<K, B, T>, loader: L) -> MockGuard<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    L: Loader<K, B, T> + 'static,
{
    let target = endpoint.downgrade();
    let (id, _) = push(endpoint, |id| {
        let once: Box<dyn Loader<K, B, T>> = Box::new(OnceLoader {
            inner: loader,
            endpoint: target,
            id,
            used: AtomicBool::new(false),
        });
        Arc::new(once)
    });
    MockGuard {
        endpoint: endpoint.clone(),
        id,
    }
}

/// Something that can be switched on and off as a unit.
pub trait Mock: Send + Sync {
    fn activate(&self);
    fn clear(&self);
}

/// A reusable mock definition for one endpoint.
///
/// Activating pushes the loader onto the endpoint's mock stack; clearing
/// removes every activation of it.
pub struct EndpointMock<K, B, T> {
    endpoint: Endpoint<K, B, T>,
    loader: SharedLoader<K, B, T>,
}

impl<K, B, T> EndpointMock<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new<L>(endpoint: &Endpoint<K, B, T>, loader: L) -> Self
    where
        L: Loader<K, B, T> + 'static,
    {
        Self {
            endpoint: endpoint.clone(),
            loader: Arc::new(Box::new(loader)),
        }
    }
}

impl<K, B, T> Mock for EndpointMock<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn activate(&self) {
        push(&self.endpoint, |_| self.loader.clone());
    }

    fn clear(&self) {
        splice(&self.endpoint, |_, loader| Arc::ptr_eq(loader, &self.loader));
    }
}

/// Several mocks activated and cleared together. Groups nest.
#[derive(Default)]
pub struct MockGroup {
    mocks: Vec<Box<dyn Mock>>,
}

impl MockGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mock: impl Mock + 'static) -> Self {
        self.mocks.push(Box::new(mock));
        self
    }
}

impl Mock for MockGroup {
    fn activate(&self) {
        for mock in &self.mocks {
            mock.activate();
        }
    }

    fn clear(&self) {
        for mock in &self.mocks {
            mock.clear();
        }
    }
}
