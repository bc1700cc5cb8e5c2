//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Loader (resolution protocol):
//!     → TransportRequest { method, url, headers, body }
//!     → Transport::send (client.rs: reqwest, or any test double)
//!     → TransportResponse { status, status_text, url, body }
//! ```
//!
//! # Design Decisions
//! - Non-2xx statuses are returned as responses, not errors; only network
//!   failures and timeouts are errors at this layer
//! - The trait is object safe so endpoints share one `Arc<dyn Transport>`

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::RequestResult;

pub use client::ReqwestTransport;
pub use types::{Headers, Method, TransportRequest, TransportResponse};

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> RequestResult<TransportResponse>;
}
