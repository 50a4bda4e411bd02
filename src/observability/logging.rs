//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Pick the level from `RUST_LOG`, the debug flag, or the config
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Logs go to stderr so the chat transcript on stdout stays readable

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Build the filter directive for this crate from configuration.
pub fn filter_directive(config: &ObservabilityConfig) -> String {
    let level = if config.debug {
        "debug".to_string()
    } else {
        config.log_level.to_ascii_lowercase()
    };
    format!("lanchat={}", level)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// is harmless; the second call is ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
