//! Error events and their resolution.
//!
//! # Responsibilities
//! - Broadcast failed responses to registered resolvers
//! - Collect the first settlement (retry with a named resolver, or veto)
//! - Let resolvers defer the decision past the broadcast
//!
//! # Design Decisions
//! - One process-wide emitter (`ErrorEmitter::global`), injectable per
//!   endpoint so tests never share listeners
//! - Settlement is a oneshot behind a shared slot; the first call wins and
//!   later calls report `false`

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::emitter::{Emitter, ListenerId, Subscription};
use crate::lock::lock;
use crate::transport::TransportResponse;

/// What a listener did with an [`ErrorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// Not interested, or already settled synchronously.
    Ignored,
    /// Will settle later through a cloned [`ResolutionHandle`].
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settlement {
    Retry(String),
    Reject,
    Unhandled,
}

/// One-shot decision channel for a failed response.
#[derive(Debug, Clone)]
pub struct ResolutionHandle {
    slot: Arc<Mutex<Option<oneshot::Sender<Settlement>>>>,
}

impl ResolutionHandle {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Settlement>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Retry the request, recording `resolver` as an attempt.
    pub fn resolve(&self, resolver: impl Into<String>) -> bool {
        self.settle(Settlement::Retry(resolver.into()))
    }

    /// Fail the request without further resolution.
    pub fn reject(&self) -> bool {
        self.settle(Settlement::Reject)
    }

    pub fn is_settled(&self) -> bool {
        lock(&self.slot, "resolution.is_settled").is_none()
    }

    pub(crate) fn settle(&self, settlement: Settlement) -> bool {
        match lock(&self.slot, "resolution.settle").take() {
            Some(tx) => tx.send(settlement).is_ok(),
            None => false,
        }
    }
}

/// A failed response offered to resolvers.
#[derive(Debug)]
pub struct ErrorEvent {
    pub response: TransportResponse,
    /// Parsed error body.
    pub content: Value,
    /// Resolvers already tried for this request.
    pub attempts: Vec<String>,
    handle: ResolutionHandle,
}

impl ErrorEvent {
    pub(crate) fn new(
        response: TransportResponse,
        content: Value,
        attempts: Vec<String>,
        handle: ResolutionHandle,
    ) -> Self {
        Self {
            response,
            content,
            attempts,
            handle,
        }
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn has_attempted(&self, resolver: &str) -> bool {
        self.attempts.iter().any(|attempt| attempt == resolver)
    }

    pub fn resolve(&self, resolver: impl Into<String>) -> bool {
        self.handle.resolve(resolver)
    }

    pub fn reject(&self) -> bool {
        self.handle.reject()
    }

    /// A handle for settling after the listener returns `Handling::Deferred`.
    pub fn handle(&self) -> ResolutionHandle {
        self.handle.clone()
    }
}

pub type ErrorListener = dyn Fn(&ErrorEvent) -> Handling + Send + Sync;

static GLOBAL: Lazy<Arc<ErrorEmitter>> = Lazy::new(|| Arc::new(ErrorEmitter::new()));

/// Broadcasts failed responses to resolvers.
pub struct ErrorEmitter {
    listeners: Arc<Emitter<ErrorListener>>,
}

impl ErrorEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Emitter::new()),
        }
    }

    /// The process-wide emitter used by endpoints that were not given one.
    pub fn global() -> Arc<ErrorEmitter> {
        GLOBAL.clone()
    }

    pub fn on<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ErrorEvent) -> Handling + Send + Sync + 'static,
    {
        self.listeners.subscribe(Arc::new(listener))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Offer `event` to every listener. Returns true if any deferred.
    pub(crate) fn broadcast(&self, event: &ErrorEvent) -> bool {
        let mut deferred = false;
        for listener in self.listeners.snapshot() {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(event))) {
                Ok(Handling::Deferred) => deferred = true,
                Ok(Handling::Ignored) => {}
                Err(_) => tracing::warn!(status = event.status(), "Error listener panicked"),
            }
        }
        deferred
    }
}

impl Default for ErrorEmitter {
    fn default() -> Self {
        Self::new()
    }
}
