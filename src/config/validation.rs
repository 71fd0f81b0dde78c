//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Keep the request timeout above the stream deadline
//! - Check addresses parse and the route prefix is usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
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

/// Check the whole configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "http.bind_address", &config.http.bind_address);
    check_addr(&mut errors, "quic.bind_address", &config.quic.bind_address);

    let prefix = &config.http.route_prefix;
    if !prefix.starts_with('/') {
        errors.push(ValidationError::new(
            "http.route_prefix",
            format!("{prefix:?} must start with '/'"),
        ));
    }
    if prefix.contains(['{', '}', '*']) {
        errors.push(ValidationError::new(
            "http.route_prefix",
            format!("{prefix:?} must be a literal path"),
        ));
    }

    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::new("http.max_body_bytes", "must be greater than 0"));
    }
    if config.http.max_reply_bytes == 0 {
        errors.push(ValidationError::new("http.max_reply_bytes", "must be greater than 0"));
    }

    if config.quic.alpn.is_empty() {
        errors.push(ValidationError::new("quic.alpn", "must not be empty"));
    }
    if config.quic.cert_path.is_empty() {
        errors.push(ValidationError::new("quic.cert_path", "must not be empty"));
    }
    if config.quic.key_path.is_empty() {
        errors.push(ValidationError::new("quic.key_path", "must not be empty"));
    }
    if config.quic.idle_timeout_secs == 0 {
        errors.push(ValidationError::new("quic.idle_timeout_secs", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.stream_secs == 0 {
        errors.push(ValidationError::new("timeouts.stream_secs", "must be greater than 0"));
    }
    if config.timeouts.stream_secs > 0
        && config.timeouts.request_secs > 0
        && config.timeouts.request_secs <= config.timeouts.stream_secs
    {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!(
                "must exceed timeouts.stream_secs ({})",
                config.timeouts.stream_secs
            ),
        ));
    }
    if config.timeouts.shutdown_grace_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.shutdown_grace_secs",
            "must be greater than 0",
        ));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.requests_per_second == 0 {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_second",
                "must be greater than 0 when rate limiting is enabled",
            ));
        }
        if config.rate_limit.burst_size == 0 {
            errors.push(ValidationError::new(
                "rate_limit.burst_size",
                "must be greater than 0 when rate limiting is enabled",
            ));
        }
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format {:?}", config.observability.log_format),
        ));
    }
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("{value:?} is not a socket address"),
        ));
    }
}
