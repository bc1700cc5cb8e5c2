//! Default `reqwest`-backed transport.
//!
//! # Responsibilities
//! - Join relative endpoint URLs onto the configured base URL
//! - Enforce connect and request timeouts
//! - Hand every response back as data, leaving status handling to the
//!   resolution protocol

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::TransportConfig;
use crate::error::{RequestError, RequestResult};
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// HTTP transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport from configuration.
    pub fn new(config: &TransportConfig) -> RequestResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone());
        if !config.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| RequestError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = match &config.base_url {
            Some(raw) => Some(Url::parse(raw).map_err(|e| {
                RequestError::Derivation(format!("Invalid base URL '{}': {}", raw, e))
            })?),
            None => None,
        };

        tracing::debug!(
            base_url = ?config.base_url,
            timeout_secs = config.timeout_secs,
            "HTTP transport initialized"
        );

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Wrap an existing client without a base URL.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
            timeout: Duration::from_secs(TransportConfig::default().timeout_secs),
        }
    }

    /// Resolve an endpoint URL, joining relative paths onto the base URL.
    pub fn resolve_url(&self, raw: &str) -> RequestResult<Url> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base
                    .join(raw)
                    .map_err(|e| RequestError::Derivation(format!("Invalid URL '{}': {}", raw, e))),
                None => Err(RequestError::Derivation(format!(
                    "Relative URL '{}' requires a configured base URL",
                    raw
                ))),
            },
            Err(e) => Err(RequestError::Derivation(format!("Invalid URL '{}': {}", raw, e))),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> RequestResult<TransportResponse> {
        let url = self.resolve_url(&request.url)?;
        let mut builder = self.client.request(request.method.into(), url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RequestError::Timeout(self.timeout)
            } else {
                RequestError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let url = response.url().to_string();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RequestError::Timeout(self.timeout)
            } else {
                RequestError::Transport(e.to_string())
            }
        })?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            url,
            body,
        })
    }
}
