//! Poison-tolerant mutex access.
//!
//! Listener callbacks and hooks run user code; a panic there must not wedge
//! the registry, so a poisoned lock is recovered and logged.

use std::sync::{Mutex, MutexGuard};

use tracing::warn;

pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(op, result = "poisoned_recovered", "Recovered from poisoned registry lock");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_recovers_poisoned_mutex() {
        let shared = Arc::new(Mutex::new(1));
        let poisoner = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(shared.is_poisoned());
        *lock(&shared, "test") += 1;
        assert_eq!(*lock(&shared, "test"), 2);
    }
}
