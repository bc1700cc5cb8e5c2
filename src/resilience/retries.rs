//! Resolver-driven retries.
//!
//! # Responsibilities
//! - Send a request and return the first successful (2xx) response
//! - Offer each failed response to the error emitter
//! - Retry after a resolver authorizes it, recording the resolver name
//!
//! # Design Decisions
//! - No automatic retry bound; resolvers decide (typically by checking
//!   `ErrorEvent::has_attempted`). `ResolutionPolicy::max_attempts` is an
//!   explicit opt-in cap
//! - Transport errors are surfaced directly; only HTTP failures are resolvable
//! - The same request (URL, headers, body) is replayed on every attempt

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ErrorDetails, RequestError, RequestResult};
use crate::observability::metrics;
use crate::resilience::resolution::{ErrorEmitter, ErrorEvent, ResolutionHandle, Settlement};
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Limits applied to the resolution loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionPolicy {
    /// Fail as unhandled once this many resolvers have been tried.
    pub max_attempts: Option<usize>,
}

impl ResolutionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }
}

/// Parse an error body as JSON, falling back to `{"message": raw}`.
pub fn parse_error_content(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| json!({ "message": body }))
}

/// Send `request`, letting resolvers recover failed responses.
pub async fn send_with_resolution(
    transport: &dyn Transport,
    request: TransportRequest,
    emitter: &ErrorEmitter,
    policy: &ResolutionPolicy,
) -> RequestResult<TransportResponse> {
    let mut attempts: Vec<String> = Vec::new();
    loop {
        let response = transport.send(request.clone()).await?;
        if response.ok() {
            return Ok(response);
        }

        let content = parse_error_content(response.text());
        let details = |response: &TransportResponse, content: Value, attempts: &[String]| {
            Arc::new(ErrorDetails {
                method: request.method,
                url: response.url.clone(),
                status: response.status,
                status_text: response.status_text.clone(),
                content,
                attempts: attempts.to_vec(),
            })
        };

        if policy.max_attempts.is_some_and(|max| attempts.len() >= max) {
            metrics::record_resolution("exhausted");
            tracing::warn!(
                url = %response.url,
                status = response.status,
                attempts = attempts.len(),
                "Resolution attempts exhausted"
            );
            return Err(RequestError::Unhandled(details(&response, content, &attempts)));
        }

        match resolve(emitter, &response, &content, &attempts).await {
            Settlement::Retry(resolver) => {
                metrics::record_resolution("retry");
                tracing::debug!(
                    url = %response.url,
                    status = response.status,
                    resolver = %resolver,
                    "Retrying after resolution"
                );
                attempts.push(resolver);
            }
            Settlement::Reject => {
                metrics::record_resolution("rejected");
                tracing::debug!(url = %response.url, status = response.status, "Resolution rejected");
                return Err(RequestError::Rejected(details(&response, content, &attempts)));
            }
            Settlement::Unhandled => {
                metrics::record_resolution("unhandled");
                tracing::warn!(
                    url = %response.url,
                    status = response.status,
                    body = %content,
                    attempts = ?attempts,
                    "Unhandled request error"
                );
                return Err(RequestError::Unhandled(details(&response, content, &attempts)));
            }
        }
    }
}

async fn resolve(
    emitter: &ErrorEmitter,
    response: &TransportResponse,
    content: &Value,
    attempts: &[String],
) -> Settlement {
    let (handle, settled) = ResolutionHandle::channel();
    let event = ErrorEvent::new(response.clone(), content.clone(), attempts.to_vec(), handle.clone());
    let deferred = emitter.broadcast(&event);
    drop(event);

    if !deferred {
        // No-op if a listener already settled synchronously.
        handle.settle(Settlement::Unhandled);
    }
    drop(handle);

    settled.await.unwrap_or(Settlement::Unhandled)
}
