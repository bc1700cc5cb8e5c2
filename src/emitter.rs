//! Listener registry shared by the invalidation and error broadcasts.
//!
//! # Design Decisions
//! - Listeners are stored as `Arc<F>` and snapshotted before each emission,
//!   so a listener may subscribe or unsubscribe from inside its callback
//! - Dropping a [`Subscription`] does not unsubscribe; only an explicit
//!   `unsubscribe` (or `off`) removes a listener

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::lock::lock;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered set of listeners of one callback type.
pub struct Emitter<F: ?Sized> {
    listeners: Mutex<Vec<(ListenerId, Arc<F>)>>,
    next_id: AtomicU64,
}

impl<F: ?Sized + Send + Sync + 'static> Emitter<F> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener, returning its id.
    pub fn add(&self, listener: Arc<F>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners, "emitter.add").push((id, listener));
        id
    }

    /// Register a listener and hand back a handle able to remove it.
    pub fn subscribe(self: &Arc<Self>, listener: Arc<F>) -> Subscription {
        let id = self.add(listener);
        let emitter = Arc::downgrade(self);
        Subscription::new(id, move || match Weak::upgrade(&emitter) {
            Some(emitter) => emitter.remove(id),
            None => false,
        })
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners, "emitter.remove");
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        lock(&self.listeners, "emitter.clear").clear();
    }

    /// The current listeners in registration order.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        lock(&self.listeners, "emitter.snapshot")
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.listeners, "emitter.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for Emitter<F> {
    fn default() -> Self {
        Self::new()
    }
}

type Cancel = Box<dyn FnOnce() -> bool + Send>;

/// Handle to a registered listener.
pub struct Subscription {
    id: ListenerId,
    cancel: Mutex<Option<Cancel>>,
}

impl Subscription {
    fn new(id: ListenerId, cancel: impl FnOnce() -> bool + Send + 'static) -> Self {
        Self {
            id,
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Returns true only for the call that removed it.
    pub fn unsubscribe(&self) -> bool {
        let cancel = lock(&self.cancel, "subscription.unsubscribe").take();
        cancel.map(|cancel| cancel()).unwrap_or(false)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Listener = dyn Fn(usize) + Send + Sync;

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let emitter: Emitter<Listener> = Emitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let seen = seen.clone();
            emitter.add(Arc::new(move |value| seen.lock().unwrap().push(tag * 10 + value)));
        }

        for listener in emitter.snapshot() {
            listener(1);
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 11, 21]);
    }

    #[test]
    fn test_unsubscribe_is_one_shot() {
        let emitter: Arc<Emitter<Listener>> = Arc::new(Emitter::new());
        let subscription = emitter.subscribe(Arc::new(|_| {}));
        assert_eq!(emitter.len(), 1);

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_drop_does_not_unsubscribe() {
        let emitter: Arc<Emitter<Listener>> = Arc::new(Emitter::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        drop(emitter.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        for listener in emitter.snapshot() {
            listener(0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_unknown_listener() {
        let emitter: Emitter<Listener> = Emitter::new();
        let id = emitter.add(Arc::new(|_| {}));
        assert!(emitter.remove(id));
        assert!(!emitter.remove(id));
    }
}
