//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Environment variables that override file settings.
pub const ENV_HTTP_ADDR: &str = "GATEWAY_HTTP_ADDR";
pub const ENV_QUIC_ADDR: &str = "GATEWAY_QUIC_ADDR";
pub const ENV_TLS_CERT: &str = "GATEWAY_TLS_CERT";
pub const ENV_TLS_KEY: &str = "GATEWAY_TLS_KEY";
pub const ENV_LOG_LEVEL: &str = "GATEWAY_LOG_LEVEL";

/// Load configuration: TOML file when given, then environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => GatewayConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse a TOML file without validating it.
pub fn parse_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply overrides found through `lookup`.
pub fn apply_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let targets: [(&str, &mut String); 5] = [
        (ENV_HTTP_ADDR, &mut config.http.bind_address),
        (ENV_QUIC_ADDR, &mut config.quic.bind_address),
        (ENV_TLS_CERT, &mut config.quic.cert_path),
        (ENV_TLS_KEY, &mut config.quic.key_path),
        (ENV_LOG_LEVEL, &mut config.observability.log_level),
    ];

    for (key, target) in targets {
        if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
            *target = value;
        }
    }
}
