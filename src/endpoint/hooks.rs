//! Post-fetch hooks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::{RequestError, RequestResult};

pub type SuccessHook<T> = Arc<dyn Fn(&T) -> BoxFuture<'static, ()> + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&RequestError) -> BoxFuture<'static, ()> + Send + Sync>;

/// Side effects run once per fetch, after the loader settles and before the
/// shared result resolves. They never change the result.
pub(crate) struct Hooks<T> {
    pub(crate) after_success: Option<SuccessHook<T>>,
    pub(crate) after_error: Option<ErrorHook>,
}

impl<T> Hooks<T> {
    pub(crate) async fn run(&self, result: &RequestResult<T>) {
        let started = match result {
            Ok(value) => self
                .after_success
                .as_ref()
                .map(|hook| catch_unwind(AssertUnwindSafe(|| hook(value)))),
            Err(error) => self
                .after_error
                .as_ref()
                .map(|hook| catch_unwind(AssertUnwindSafe(|| hook(error)))),
        };

        let reaction = match started {
            None => return,
            Some(Ok(reaction)) => reaction,
            Some(Err(_)) => {
                tracing::warn!(success = result.is_ok(), "Endpoint hook panicked");
                return;
            }
        };
        if AssertUnwindSafe(reaction).catch_unwind().await.is_err() {
            tracing::warn!(success = result.is_ok(), "Endpoint hook panicked");
        }
    }
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            after_success: None,
            after_error: None,
        }
    }
}

impl<T> Clone for Hooks<T> {
    fn clone(&self) -> Self {
        Self {
            after_success: self.after_success.clone(),
            after_error: self.after_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_matching_hook() {
        let successes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let (s, e) = (successes.clone(), errors.clone());
        let hooks: Hooks<u32> = Hooks {
            after_success: Some(Arc::new(move |value: &u32| {
                s.fetch_add(*value as usize, Ordering::SeqCst);
                async {}.boxed()
            })),
            after_error: Some(Arc::new(move |_: &RequestError| {
                e.fetch_add(1, Ordering::SeqCst);
                async {}.boxed()
            })),
        };

        hooks.run(&Ok(5)).await;
        hooks.run(&Err(RequestError::loader("x"))).await;
        assert_eq!(successes.load(Ordering::SeqCst), 5);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_hook_is_contained() {
        let hooks: Hooks<u32> = Hooks {
            after_success: Some(Arc::new(|_: &u32| async { panic!("hook") }.boxed())),
            after_error: Some(Arc::new(|_: &RequestError| -> BoxFuture<'static, ()> { panic!("hook") })),
        };
        hooks.run(&Ok(1)).await;
        hooks.run(&Err(RequestError::loader("x"))).await;
    }
}
