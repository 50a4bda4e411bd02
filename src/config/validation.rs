//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, sizes large enough for one block)
//! - Check role consistency (client mode needs a server address)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ChatConfig → Result<(), Vec<ValidationError>>
//! - Address syntax is left to the resolver at bind/connect time (hostnames allowed)

use thiserror::Error;

use crate::config::schema::ChatConfig;
use crate::crypto::BLOCK_SIZE;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be at least 1")]
    ZeroLimit { field: &'static str },

    #[error("{field} must not be empty")]
    EmptyAddress { field: &'static str },

    #[error("{field} '{value}' must be of the form host:port")]
    MissingPort { field: &'static str, value: String },

    #[error("server address required when not serving (use --server-ip)")]
    MissingServerAddress,

    #[error("relay.max_message_size must be at least {min}, got {actual}")]
    MessageSizeTooSmall { min: usize, actual: usize },

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate the semantic constraints of a configuration.
pub fn validate_config(config: &ChatConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.mode.serve {
        check_address(&mut errors, "remote.bind_address", &config.remote.bind_address);
        if config.remote.max_connections == 0 {
            errors.push(ValidationError::ZeroLimit {
                field: "remote.max_connections",
            });
        }
    } else {
        match config.mode.server_address.as_deref() {
            Some(address) if !address.trim().is_empty() => {
                check_address(&mut errors, "mode.server_address", address);
            }
            _ => errors.push(ValidationError::MissingServerAddress),
        }
        if config.bridge.max_attempts == 0 {
            errors.push(ValidationError::ZeroLimit {
                field: "bridge.max_attempts",
            });
        }
    }

    check_address(&mut errors, "local.bind_address", &config.local.bind_address);
    if config.local.max_connections == 0 {
        errors.push(ValidationError::ZeroLimit {
            field: "local.max_connections",
        });
    }

    if config.relay.max_message_size < BLOCK_SIZE {
        errors.push(ValidationError::MessageSizeTooSmall {
            min: BLOCK_SIZE,
            actual: config.relay.max_message_size,
        });
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::EmptyAddress { field });
        return;
    }
    let has_port = value
        .rsplit_once(':')
        .map(|(_, port)| port.parse::<u16>().is_ok())
        .unwrap_or(false);
    if !has_port {
        errors.push(ValidationError::MissingPort {
            field,
            value: value.to_string(),
        });
    }
}
