//! Request error taxonomy.
//!
//! Every failure an endpoint can produce is a [`RequestError`]. The type is
//! `Clone` because one failed fetch is shared by every consumer of the
//! deduplicated future; the heavy diagnostic payload sits behind an `Arc` so
//! all of them see the same [`ErrorDetails`] instance.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::transport::Method;

/// Diagnostics for a failed response that no resolver recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetails {
    /// Method of the failed request.
    pub method: Method,
    /// URL the response was received from.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase for the status, empty if unknown.
    pub status_text: String,
    /// Parsed error body (`{"message": raw}` when the body is not JSON).
    pub content: Value,
    /// Resolver names that authorized a retry, in order.
    pub attempts: Vec<String>,
}

impl ErrorDetails {
    /// The `message` field of the parsed body, if present.
    pub fn message(&self) -> Option<&str> {
        self.content.get("message").and_then(Value::as_str)
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {} {}", self.method, self.url, self.status, self.content)?;
        if self.attempts.is_empty() {
            write!(f, " (no resolve attempts)")
        } else {
            write!(f, " (resolve attempts: {})", self.attempts.join(", "))
        }
    }
}

/// Errors produced by endpoints, loaders and transports.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unhandled request error: {0}")]
    Unhandled(Arc<ErrorDetails>),

    #[error("Error resolution rejected: {0}")]
    Rejected(Arc<ErrorDetails>),

    #[error("Failed to derive request: {0}")]
    Derivation(String),

    #[error("Failed to encode request body: {0}")]
    Encode(String),

    #[error("Failed to decode response body: {0}")]
    Decode(String),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Request task aborted: {0}")]
    Aborted(String),
}

impl RequestError {
    /// Wrap an arbitrary failure of a custom loader.
    pub fn loader(err: impl fmt::Display) -> Self {
        RequestError::Loader(err.to_string())
    }

    /// Response diagnostics for terminal HTTP failures.
    pub fn details(&self) -> Option<&Arc<ErrorDetails>> {
        match self {
            RequestError::Unhandled(details) | RequestError::Rejected(details) => Some(details),
            _ => None,
        }
    }

    /// HTTP status of the failed response, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        self.details().map(|d| d.status)
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::Transport(_) => "transport",
            RequestError::Timeout(_) => "timeout",
            RequestError::Unhandled(_) => "unhandled",
            RequestError::Rejected(_) => "rejected",
            RequestError::Derivation(_) => "derivation",
            RequestError::Encode(_) => "encode",
            RequestError::Decode(_) => "decode",
            RequestError::Loader(_) => "loader",
            RequestError::Aborted(_) => "aborted",
        }
    }
}

/// Result type for endpoint operations.
pub type RequestResult<T> = Result<T, RequestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details() -> ErrorDetails {
        ErrorDetails {
            method: Method::Get,
            url: "http://localhost/user/4".to_string(),
            status: 404,
            status_text: "Not Found".to_string(),
            content: json!({"message": "no such user"}),
            attempts: vec![],
        }
    }

    #[test]
    fn test_details_message() {
        assert_eq!(details().message(), Some("no such user"));

        let mut raw = details();
        raw.content = json!([1, 2]);
        assert_eq!(raw.message(), None);
    }

    #[test]
    fn test_error_display() {
        let err = RequestError::Unhandled(Arc::new(details()));
        let text = err.to_string();
        assert!(text.contains("404"));
        assert!(text.contains("http://localhost/user/4"));
        assert!(text.contains("no resolve attempts"));

        let mut retried = details();
        retried.attempts = vec!["refresh-token".to_string()];
        let err = RequestError::Rejected(Arc::new(retried));
        assert!(err.to_string().contains("refresh-token"));
    }

    #[test]
    fn test_status_accessor() {
        let err = RequestError::Unhandled(Arc::new(details()));
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.kind(), "unhandled");
        assert_eq!(RequestError::loader("boom").status(), None);
        assert_eq!(RequestError::loader("boom").to_string(), "Loader error: boom");
    }
}
