//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! section and field has a default, so an empty file is a valid config.

use serde::{Deserialize, Serialize};

use crate::resilience::ResolutionPolicy;

/// Root configuration for a request registry.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Endpoint cache settings.
    pub cache: CacheConfig,

    /// Default HTTP transport settings.
    pub transport: TransportConfig,

    /// Limits for resolver-driven retries.
    pub resolution: ResolutionPolicy,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Endpoint cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache GET responses. When false, endpoints built by the registry
    /// never cache.
    pub enabled: bool,

    /// Grace period after the last consumer releases a key, in milliseconds.
    pub eviction_timeout_ms: u64,

    /// Per-endpoint entry bound (LRU). Unbounded when absent.
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            eviction_timeout_ms: 20_000,
            max_entries: None,
        }
    }
}

/// Default HTTP transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base URL that relative endpoint URLs are joined onto.
    pub base_url: Option<String>,

    /// Total request timeout in seconds.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Honor HTTP(S)_PROXY environment variables.
    pub system_proxy: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
            connect_timeout_secs: 5,
            user_agent: concat!("request-registry/", env!("CARGO_PKG_VERSION")).to_string(),
            system_proxy: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: RegistryConfig = toml::from_str("").unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.eviction_timeout_ms, 20_000);
        assert_eq!(config.transport.timeout_secs, 30);
        assert!(config.transport.system_proxy);
        assert_eq!(config.resolution.max_attempts, None);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config: RegistryConfig = toml::from_str(
            r#"
            [cache]
            max_entries = 64

            [transport]
            base_url = "https://api.example.com/v1/"

            [resolution]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.max_entries, Some(64));
        assert!(config.cache.enabled);
        assert_eq!(config.transport.base_url.as_deref(), Some("https://api.example.com/v1/"));
        assert_eq!(config.transport.connect_timeout_secs, 5);
        assert_eq!(config.resolution.max_attempts, Some(3));
    }
}
