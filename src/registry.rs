//! Config-driven endpoint factory.
//!
//! # Responsibilities
//! - Build one shared HTTP transport from `[transport]`
//! - Own the error emitter that resolvers subscribe to
//! - Hand out endpoint builders pre-wired with transport, emitter, eviction
//!   timeout, storage bound and resolution policy
//!
//! # Design Decisions
//! - Every builder setting can still be overridden per endpoint
//! - Each registry owns its emitter; resolvers registered on one registry
//!   never see failures of another

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{ConfigError, RegistryConfig};
use crate::endpoint::{DeleteEndpoint, EndpointBuilder, GetEndpoint, PostEndpoint, PutEndpoint};
use crate::resilience::ErrorEmitter;
use crate::transport::{ReqwestTransport, Transport};

/// Shared wiring for a family of endpoints.
#[derive(Clone)]
pub struct RequestRegistry {
    config: Arc<RegistryConfig>,
    transport: Arc<dyn Transport>,
    errors: Arc<ErrorEmitter>,
}

impl RequestRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(&config.transport)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Use a custom transport; `[transport]` is ignored.
    pub fn with_transport(config: RegistryConfig, transport: Arc<dyn Transport>) -> Self {
        tracing::info!(
            cache_enabled = config.cache.enabled,
            eviction_timeout_ms = config.cache.eviction_timeout_ms,
            max_entries = ?config.cache.max_entries,
            max_attempts = ?config.resolution.max_attempts,
            "Request registry created"
        );
        Self {
            config: Arc::new(config),
            transport,
            errors: Arc::new(ErrorEmitter::new()),
        }
    }

    /// Share an existing emitter (for example [`ErrorEmitter::global`]).
    pub fn with_error_emitter(mut self, errors: Arc<ErrorEmitter>) -> Self {
        self.errors = errors;
        self
    }

    /// Resolvers subscribe here.
    pub fn errors(&self) -> &Arc<ErrorEmitter> {
        &self.errors
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn get<K, T, F>(&self, url: F) -> EndpointBuilder<K, (), T, GetEndpoint<K, T>>
    where
        K: Clone + Send + Sync + 'static,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        self.wire(GetEndpoint::builder(url))
    }

    pub fn delete<K, T, F>(&self, url: F) -> EndpointBuilder<K, (), T, DeleteEndpoint<K, T>>
    where
        K: Clone + Send + Sync + 'static,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        self.wire(DeleteEndpoint::builder(url))
    }

    pub fn post<K, B, T, F>(&self, url: F) -> EndpointBuilder<K, B, T, PostEndpoint<K, B, T>>
    where
        K: Clone + Send + Sync + 'static,
        B: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        self.wire(PostEndpoint::builder(url))
    }

    pub fn put<K, B, T, F>(&self, url: F) -> EndpointBuilder<K, B, T, PutEndpoint<K, B, T>>
    where
        K: Clone + Send + Sync + 'static,
        B: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        self.wire(PutEndpoint::builder(url))
    }

    fn wire<K, B, T, V>(&self, builder: EndpointBuilder<K, B, T, V>) -> EndpointBuilder<K, B, T, V>
    where
        K: Clone + Send + Sync + 'static,
        B: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        V: From<crate::endpoint::Endpoint<K, B, T>>,
    {
        let cache = &self.config.cache;
        let mut builder = builder
            .transport(self.transport.clone())
            .error_emitter(self.errors.clone())
            .resolution_policy(self.config.resolution.clone())
            .eviction_timeout(Duration::from_millis(cache.eviction_timeout_ms));
        if let Some(max_entries) = cache.max_entries {
            builder = builder.max_entries(max_entries);
        }
        if !cache.enabled {
            builder = builder.cache_request(false);
        }
        builder
    }
}

impl std::fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("config", &self.config)
            .field("error_listeners", &self.errors.listener_count())
            .finish()
    }
}
