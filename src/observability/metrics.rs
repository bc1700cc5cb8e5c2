//! Metrics collection and exposition.
//!
//! # Metrics
//! - `request_registry_cache_lookups_total` (counter): lookups by result (hit, miss)
//! - `request_registry_fetches_total` (counter): loader runs by method and outcome
//! - `request_registry_fetch_duration_seconds` (histogram): loader latency by method
//! - `request_registry_invalidations_total` (counter): invalidation broadcasts
//! - `request_registry_evictions_total` (counter): entries evicted after retention ended
//! - `request_registry_resolution_attempts_total` (counter): resolution outcomes
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::error::RequestError;
use crate::transport::Method;

const CACHE_LOOKUPS: &str = "request_registry_cache_lookups_total";
const FETCHES: &str = "request_registry_fetches_total";
const FETCH_DURATION: &str = "request_registry_fetch_duration_seconds";
const INVALIDATIONS: &str = "request_registry_invalidations_total";
const EVICTIONS: &str = "request_registry_evictions_total";
const RESOLUTIONS: &str = "request_registry_resolution_attempts_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the Prometheus recorder and serve scrapes on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(CACHE_LOOKUPS, Unit::Count, "Endpoint cache lookups by result.");
        describe_counter!(FETCHES, Unit::Count, "Loader runs by method and outcome.");
        describe_histogram!(FETCH_DURATION, Unit::Seconds, "Loader latency including retries.");
        describe_counter!(INVALIDATIONS, Unit::Count, "Cache invalidation broadcasts.");
        describe_counter!(EVICTIONS, Unit::Count, "Entries evicted after their last consumer left.");
        describe_counter!(RESOLUTIONS, Unit::Count, "Error resolution outcomes.");
    });
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(CACHE_LOOKUPS, "result" => result).increment(1);
}

/// Record one finished loader run; `error` is `None` on success.
pub fn record_fetch(method: Method, error: Option<&RequestError>, elapsed: Duration) {
    let outcome = error.map_or("success", RequestError::kind);
    counter!(FETCHES, "method" => method.as_str(), "outcome" => outcome).increment(1);
    histogram!(FETCH_DURATION, "method" => method.as_str()).record(elapsed.as_secs_f64());
}

pub fn record_invalidation() {
    counter!(INVALIDATIONS).increment(1);
}

pub fn record_eviction() {
    counter!(EVICTIONS).increment(1);
}

/// `outcome` is one of retry, rejected, unhandled, exhausted.
pub fn record_resolution(outcome: &'static str) {
    counter!(RESOLUTIONS, "outcome" => outcome).increment(1);
}
