//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, bounds > 0)
//! - Check that URLs, addresses and log levels parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RegistryConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;
use url::Url;

use crate::config::schema::RegistryConfig;

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &RegistryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.cache.max_entries == Some(0) {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than 0"));
    }

    if let Some(base_url) = &config.transport.base_url {
        match Url::parse(base_url) {
            Ok(url) if url.cannot_be_a_base() => {
                errors.push(ValidationError::new("transport.base_url", "cannot be used as a base"));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new("transport.base_url", e.to_string())),
        }
    }
    if config.transport.timeout_secs == 0 {
        errors.push(ValidationError::new("transport.timeout_secs", "must be greater than 0"));
    }
    if config.transport.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("transport.connect_timeout_secs", "must be greater than 0"));
    }

    if config.resolution.max_attempts == Some(0) {
        errors.push(ValidationError::new("resolution.max_attempts", "must be greater than 0"));
    }

    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("invalid level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid address '{}'", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
