//! Live observation of an endpoint's data.
//!
//! # Data Flow
//! ```text
//! observe(keys, cb):
//!     → keep_in_cache(keys)            (retention held by the Observation)
//!     → reload: invoke(keys) → cb(value)
//!     → on CacheClear: reload again
//!
//! Each reload takes a new sequence number; a result is delivered only if
//! its sequence is still the latest when it settles.
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use tokio::sync::watch;

use crate::cache::{CacheEvent, Retention};
use crate::emitter::Subscription;
use crate::endpoint::core::{Endpoint, WeakEndpoint};
use crate::error::{RequestError, RequestResult};
use crate::future::RequestFuture;

/// Observable state of one endpoint key.
#[derive(Debug, Clone)]
pub enum EndpointState<T> {
    /// First load in flight.
    Loading,
    /// Reloading; carries the previous value.
    Updating(T),
    Done(T),
    Failed(RequestError),
}

impl<T: Clone> EndpointState<T> {
    fn reloading(&self) -> Self {
        match self {
            EndpointState::Done(value) | EndpointState::Updating(value) => EndpointState::Updating(value.clone()),
            EndpointState::Loading | EndpointState::Failed(_) => EndpointState::Loading,
        }
    }

    /// The latest value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            EndpointState::Done(value) | EndpointState::Updating(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, EndpointState::Loading | EndpointState::Updating(_))
    }

    pub fn error(&self) -> Option<&RequestError> {
        match self {
            EndpointState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl<T> From<RequestResult<T>> for EndpointState<T> {
    fn from(result: RequestResult<T>) -> Self {
        match result {
            Ok(value) => EndpointState::Done(value),
            Err(error) => EndpointState::Failed(error),
        }
    }
}

type ValueSink<T> = Arc<dyn Fn(T) + Send + Sync>;
type FutureSink<T> = Arc<dyn Fn(RequestFuture<T>) + Send + Sync>;

enum Sink<T> {
    Value(ValueSink<T>),
    Future(FutureSink<T>),
    State(watch::Sender<EndpointState<T>>),
}

struct Observer<K, B, T> {
    endpoint: WeakEndpoint<K, B, T>,
    keys: K,
    latest: AtomicU64,
    sink: Sink<T>,
}

impl<K, B, T> Observer<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Trigger a fetch and deliver its result if no newer fetch was triggered.
    fn reload(self: &Arc<Self>) -> BoxFuture<'static, ()> {
        let Some(endpoint) = self.endpoint.upgrade() else {
            return future::ready(()).boxed();
        };
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = endpoint.invoke(self.keys.clone(), None);

        match &self.sink {
            Sink::Future(deliver) => deliver(pending.clone()),
            Sink::State(state) => {
                state.send_if_modified(|current| {
                    if matches!(current, EndpointState::Loading) {
                        return false;
                    }
                    *current = current.reloading();
                    true
                });
            }
            Sink::Value(_) => {}
        }

        let observer = self.clone();
        async move {
            let result = pending.await;
            if observer.latest.load(Ordering::SeqCst) != seq {
                tracing::trace!(seq, "Dropping superseded result");
                return;
            }
            match &observer.sink {
                Sink::Value(deliver) => {
                    if let Ok(value) = result {
                        deliver(value);
                    }
                }
                Sink::State(state) => {
                    state.send_replace(EndpointState::from(result));
                }
                Sink::Future(_) => {}
            }
        }
        .boxed()
    }
}

/// An active observation. Disposing (or dropping) it stops reloads and
/// releases the retained cache entry.
pub struct Observation {
    subscription: Subscription,
    retention: Retention,
}

impl Observation {
    pub fn dispose(&self) {
        self.subscription.unsubscribe();
        self.retention.release();
    }

    pub fn cache_key(&self) -> &str {
        self.retention.key()
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// An observation exposing the endpoint state through a `watch` channel.
pub struct StateObservation<T> {
    receiver: watch::Receiver<EndpointState<T>>,
    observation: Observation,
}

impl<T: Clone> StateObservation<T> {
    pub fn current(&self) -> EndpointState<T> {
        self.receiver.borrow().clone()
    }

    /// A receiver for awaiting state changes.
    pub fn subscribe(&self) -> watch::Receiver<EndpointState<T>> {
        self.receiver.clone()
    }

    /// Wait for the next state change and return it.
    pub async fn changed(&mut self) -> Option<EndpointState<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn dispose(&self) {
        self.observation.dispose();
    }
}

impl<K, B, T> Endpoint<K, B, T>
where
    K: Clone + Send + Sync + 'static,
    B: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn start_observing(&self, keys: K, sink: Sink<T>) -> RequestResult<Observation> {
        let retention = self.keep_in_cache(&keys)?;
        let observer = Arc::new(Observer {
            endpoint: self.downgrade(),
            keys,
            latest: AtomicU64::new(0),
            sink,
        });

        tokio::spawn(observer.reload());
        let subscription = self.on(CacheEvent::CacheClear, move |_| observer.reload());
        Ok(Observation {
            subscription,
            retention,
        })
    }

    /// Deliver the value for `keys` now and after every invalidation.
    ///
    /// Failed loads are not delivered. Must be called within a Tokio runtime.
    pub fn observe<F>(&self, keys: K, callback: F) -> RequestResult<Observation>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.start_observing(keys, Sink::Value(Arc::new(callback)))
    }

    /// Like [`observe`](Self::observe), but hands over each pending future
    /// as soon as its fetch is triggered.
    pub fn observe_promise<F>(&self, keys: K, callback: F) -> RequestResult<Observation>
    where
        F: Fn(RequestFuture<T>) + Send + Sync + 'static,
    {
        self.start_observing(keys, Sink::Future(Arc::new(callback)))
    }

    /// Track loading, updating, done and failed states for `keys`.
    pub fn observe_state(&self, keys: K) -> RequestResult<StateObservation<T>> {
        let (state, receiver) = watch::channel(EndpointState::Loading);
        let observation = self.start_observing(keys, Sink::State(state))?;
        Ok(StateObservation {
            receiver,
            observation,
        })
    }
}
