//! Configuration validation.
//!
//! Serde handles syntactic checks; this module covers the semantic ones.
//! Returns all validation errors, not just the first.

use crate::config::schema::GateConfig;

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration before it is accepted into the system.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut fail = |field: &'static str, message: String| {
        errors.push(ValidationError { field, message });
    };

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        fail(
            "listener.bind_address",
            format!("not a valid socket address: {:?}", config.listener.bind_address),
        );
    }

    if config.limiter.enabled {
        if config.limiter.requests_per_second <= 0.0 {
            fail("limiter.requests_per_second", "must be positive".to_string());
        }
        if config.limiter.burst == 0 {
            fail("limiter.burst", "must be at least 1".to_string());
        }
        if config.limiter.sweep_interval_secs == 0 {
            fail("limiter.sweep_interval_secs", "must be positive".to_string());
        }
        if config.limiter.idle_window_secs < config.limiter.sweep_interval_secs {
            fail(
                "limiter.idle_window_secs",
                "must not be shorter than the sweep interval".to_string(),
            );
        }
    }

    if config.tokens.activation_ttl_secs == 0 {
        fail("tokens.activation_ttl_secs", "must be positive".to_string());
    }
    if config.tokens.authentication_ttl_secs == 0 {
        fail("tokens.authentication_ttl_secs", "must be positive".to_string());
    }

    if config.storage.timeout_secs == 0 {
        fail("storage.timeout_secs", "must be positive".to_string());
    }
    if config.http.request_timeout_secs == 0 {
        fail("http.request_timeout_secs", "must be positive".to_string());
    }
    if config.http.max_body_bytes == 0 {
        fail("http.max_body_bytes", "must be positive".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
