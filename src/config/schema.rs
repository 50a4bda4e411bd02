//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a chat node.
//! All types derive Serde traits for deserialization from config files.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read size used by remote handlers, one read per relayed chunk.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Root configuration for a chat node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ChatConfig {
    /// Server or client role and transport.
    pub mode: ModeConfig,

    /// Listener for remote (encrypted) peers, used when serving.
    pub remote: ListenerConfig,

    /// Listener for the local plain-text session.
    pub local: LocalConfig,

    /// Relay tuning.
    pub relay: RelayConfig,

    /// Outbound connection settings, used in client mode.
    pub bridge: BridgeConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Remote transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Raw TCP byte stream.
    #[default]
    Tcp,
    /// WebSocket (not implemented).
    Ws,
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "ws" => Ok(Protocol::Ws),
            other => Err(format!("unknown protocol '{}' (expected tcp or ws)", other)),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Ws => write!(f, "ws"),
        }
    }
}

/// Role of this process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ModeConfig {
    /// Accept remote peers (server) instead of dialing one (client).
    pub serve: bool,

    /// Remote transport.
    pub protocol: Protocol,

    /// Server to dial in client mode (e.g., "192.168.1.10:9999").
    pub server_address: Option<String>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9999").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9999".to_string(),
            max_connections: 1,
        }
    }
}

/// Local telnet-style listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Bind address; loopback by default so only this host can join.
    pub bind_address: String,

    /// Maximum concurrent local sessions.
    pub max_connections: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:10000".to_string(),
            max_connections: 1,
        }
    }
}

/// Relay tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum bytes read from a remote peer per read call.
    pub max_message_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Outbound connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Connection attempts before giving up (1 = no retry).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 250,
            max_delay_ms: 5000,
        }
    }
}

impl BridgeConfig {
    /// Pause before redialing after `failures` failed dials.
    ///
    /// The first retry waits `base_delay_ms`; each further failure doubles
    /// it up to `max_delay_ms`. Up to a tenth of the delay is added at
    /// random so clients started together do not redial together.
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(63);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_delay_ms);
        let spread_ms = rand::thread_rng().gen_range(0..=delay_ms / 10);
        Duration::from_millis(delay_ms + spread_ms)
    }
}

/// Timeout configuration. Zero disables a timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outbound connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Per-recipient broadcast write timeout in seconds.
    pub write_secs: u64,

    /// Idle remote connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            write_secs: 0,
            idle_secs: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Verbose terminal messages; forces `debug` level.
    pub debug: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
