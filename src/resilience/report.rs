//! Deduplicated error reporting.
//!
//! A failed fetch is shared by every consumer of its future, so the same
//! error can reach a reporting sink many times. The reporter forwards each
//! distinct failed response once, using the identity of its shared
//! [`ErrorDetails`].

use std::sync::{Arc, Mutex, Weak};

use crate::error::{ErrorDetails, RequestError};
use crate::lock::lock;

type ReportFn = dyn Fn(&ErrorDetails) + Send + Sync;

pub struct ErrorReporter {
    seen: Mutex<Vec<Weak<ErrorDetails>>>,
    callback: Box<ReportFn>,
}

impl ErrorReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ErrorDetails) + Send + Sync + 'static,
    {
        Self {
            seen: Mutex::new(Vec::new()),
            callback: Box::new(callback),
        }
    }

    /// Forward the error's details unless this response was already reported.
    ///
    /// Returns true if the callback ran. Errors without response details
    /// (transport failures, decode errors) are not reported.
    pub fn report(&self, error: &RequestError) -> bool {
        let Some(details) = error.details() else {
            return false;
        };
        {
            let mut seen = lock(&self.seen, "reporter.report");
            seen.retain(|weak| weak.strong_count() > 0);
            if seen.iter().any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(details))) {
                return false;
            }
            seen.push(Arc::downgrade(details));
        }
        (self.callback)(details);
        true
    }
}
