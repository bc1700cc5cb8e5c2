//! Shared request futures and eager task spawning.
//!
//! Fetches start when an endpoint is called, not when the returned future is
//! first polled. Work is therefore spawned onto the Tokio runtime and the
//! caller receives a `Shared` handle to its outcome.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tokio::runtime::Handle;

use crate::error::{RequestError, RequestResult};

/// The deduplicated outcome of one fetch, cloneable by any number of callers.
pub type RequestFuture<T> = Shared<BoxFuture<'static, RequestResult<T>>>;

/// An already settled request future.
pub fn settled<T>(result: RequestResult<T>) -> RequestFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    future::ready(result).boxed().shared()
}

/// Start `task` right away on the current runtime.
///
/// Outside a runtime the task runs lazily when the returned future is polled.
/// Panics and cancellations surface as `RequestError::Aborted`.
pub(crate) fn spawn_eager<F>(task: F) -> BoxFuture<'static, Result<F::Output, RequestError>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            let join = handle.spawn(task);
            async move { join.await.map_err(|e| RequestError::Aborted(e.to_string())) }.boxed()
        }
        Err(_) => AssertUnwindSafe(task)
            .catch_unwind()
            .map(|outcome| outcome.map_err(|_| RequestError::Aborted("task panicked".to_string())))
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_spawn_eager_runs_without_polling() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let _pending = spawn_eager(async move { flag.store(true, Ordering::SeqCst) });

        tokio::task::yield_now().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawn_eager_reports_panic() {
        let outcome = spawn_eager(async { panic!("loader exploded") }).await;
        assert!(matches!(outcome, Err(RequestError::Aborted(_))));
    }

    #[test]
    fn test_spawn_eager_outside_runtime() {
        let pending = spawn_eager(async { 7 });
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert_eq!(runtime.block_on(pending).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_settled_is_shared() {
        let first = settled::<u32>(Ok(3));
        let second = first.clone();
        assert_eq!(first.await.unwrap(), 3);
        assert_eq!(second.await.unwrap(), 3);
    }
}
