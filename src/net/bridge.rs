//! Outbound connection for the client role.
//!
//! # Responsibilities
//! - Dial the configured server, bounded by the connect timeout
//! - Retry with exponential backoff when more than one attempt is allowed
//! - Drive the established stream through the remote handler
//!
//! # Design Decisions
//! - One attempt by default: a client that cannot reach its server exits
//! - The bridged stream is an ordinary remote connection once established

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::BridgeConfig;
use crate::observability::metrics;
use crate::relay::remote::{RemoteEnd, RemoteHandler};
use crate::resilience::timeouts::with_deadline;

/// Failure to establish the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("couldn't connect to {address} after {attempts} attempt(s): {source}")]
    Connect {
        address: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Dials one server and relays through it.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    address: String,
    connect_timeout: Option<Duration>,
    max_attempts: u32,
    policy: BridgeConfig,
}

impl BridgeConnector {
    pub fn new(address: impl Into<String>, policy: &BridgeConfig, connect_timeout: Option<Duration>) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            max_attempts: policy.max_attempts.max(1),
            policy: policy.clone(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open the outbound connection, retrying per the configured policy.
    ///
    /// Attempt `n` that fails is followed by `BridgeConfig::retry_delay(n)`
    /// when attempts remain.
    pub async fn connect(&self) -> Result<(TcpStream, SocketAddr), BridgeError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = with_deadline(self.connect_timeout, async {
                let stream = TcpStream::connect(&self.address).await?;
                let peer = stream.peer_addr()?;
                Ok::<_, std::io::Error>((stream, peer))
            })
            .await;

            match result {
                Ok((stream, peer)) => {
                    metrics::record_connection_opened("bridge");
                    tracing::info!(server = %peer, attempt, "Connected to server");
                    return Ok((stream, peer));
                }
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.policy.retry_delay(attempt);
                    tracing::warn!(
                        address = %self.address,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    return Err(BridgeError::Connect {
                        address: self.address.clone(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Relay through an established bridge until it ends.
    pub async fn drive(&self, stream: TcpStream, peer: SocketAddr, handler: &RemoteHandler) -> RemoteEnd {
        tracing::debug!(server = %peer, "Driving bridge through remote handler");
        handler.handle_tcp(stream, peer).await
    }
}
