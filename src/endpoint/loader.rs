//! Replaceable loading strategies.
//!
//! An endpoint never talks to the transport directly; it hands a
//! [`LoadRequest`] to its current [`Loader`]. The default [`HttpLoader`]
//! serializes the body, runs the resolution protocol and decodes the JSON
//! response. Mocks and custom data sources swap in their own loader.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{RequestError, RequestResult};
use crate::resilience::{send_with_resolution, ErrorEmitter, ResolutionPolicy};
use crate::transport::{Headers, Method, Transport, TransportRequest};

/// Everything a loader needs for one fetch.
#[derive(Debug, Clone)]
pub struct LoadRequest<K, B> {
    pub method: Method,
    pub keys: K,
    pub url: String,
    pub headers: Headers,
    pub body: Option<B>,
}

/// Produces the value for one fetch.
#[async_trait]
pub trait Loader<K, B, T>: Send + Sync {
    async fn load(&self, request: LoadRequest<K, B>) -> RequestResult<T>;
}

/// The loader currently installed on an endpoint.
pub type SharedLoader<K, B, T> = Arc<Box<dyn Loader<K, B, T>>>;

/// Loads over HTTP through the resolution protocol.
pub struct HttpLoader {
    transport: Arc<dyn Transport>,
    emitter: Arc<ErrorEmitter>,
    policy: ResolutionPolicy,
}

impl HttpLoader {
    pub fn new(transport: Arc<dyn Transport>, emitter: Arc<ErrorEmitter>, policy: ResolutionPolicy) -> Self {
        Self {
            transport,
            emitter,
            policy,
        }
    }
}

#[async_trait]
impl<K, B, T> Loader<K, B, T> for HttpLoader
where
    K: Send + 'static,
    B: Serialize + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    async fn load(&self, request: LoadRequest<K, B>) -> RequestResult<T> {
        let LoadRequest {
            method,
            url,
            headers,
            body,
            ..
        } = request;
        let body = body
            .map(|body| serde_json::to_string(&body))
            .transpose()
            .map_err(|e| RequestError::Encode(e.to_string()))?;

        let transport_request = TransportRequest {
            method,
            url,
            headers,
            body,
        };
        let response =
            send_with_resolution(self.transport.as_ref(), transport_request, &self.emitter, &self.policy).await?;
        decode_body(response.text())
    }
}

/// Decode a JSON response body. An empty body decodes as `null`.
pub fn decode_body<T: DeserializeOwned>(text: &str) -> RequestResult<T> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| RequestError::Decode(e.to_string()))
}

/// A loader backed by an async closure.
pub struct FnLoader<F> {
    load: F,
}

/// Wrap an async closure as a [`Loader`].
pub fn loader_fn<F>(load: F) -> FnLoader<F> {
    FnLoader { load }
}

#[async_trait]
impl<K, B, T, F, Fut> Loader<K, B, T> for FnLoader<F>
where
    F: Fn(LoadRequest<K, B>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RequestResult<T>> + Send + 'static,
    K: Send + 'static,
    B: Send + 'static,
    T: Send + 'static,
{
    async fn load(&self, request: LoadRequest<K, B>) -> RequestResult<T> {
        (self.load)(request).await
    }
}
