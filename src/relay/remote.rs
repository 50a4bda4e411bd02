//! Handler for encrypted remote peers.
//!
//! # Data Flow
//! ```text
//! socket read (≤ max_message_size)
//!     ├─► registry.broadcast(raw chunk)   other remotes get identical ciphertext
//!     └─► codec.decode(chunk) ─► display  local side effect only
//! ```
//!
//! # Design Decisions
//! - Ciphertext is relayed verbatim; this node never re-encrypts
//! - A chunk that fails to decode is still relayed
//! - Read errors that mean the stream is gone end the loop; other read
//!   errors are logged and reading continues

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

use crate::crypto::BlockCipherCodec;
use crate::net::connection::Connection;
use crate::observability::metrics;
use crate::relay::display::{printable, ChatDisplay};
use crate::relay::registry::{ConnectionClass, RegistryHandle};

/// Why a remote read loop stopped.
#[derive(Debug)]
pub enum RemoteEnd {
    /// Peer closed its side.
    Eof,
    /// The stream failed in a way that cannot recover.
    Lost(std::io::Error),
    /// Nothing was received within the idle timeout.
    Idle(Duration),
}

/// Serves one remote peer for the lifetime of its connection.
#[derive(Clone)]
pub struct RemoteHandler {
    registry: RegistryHandle,
    codec: Arc<BlockCipherCodec>,
    display: Arc<dyn ChatDisplay>,
    max_message_size: usize,
    idle_timeout: Option<Duration>,
}

impl RemoteHandler {
    pub fn new(
        registry: RegistryHandle,
        codec: Arc<BlockCipherCodec>,
        display: Arc<dyn ChatDisplay>,
        max_message_size: usize,
    ) -> Self {
        Self {
            registry,
            codec,
            display,
            max_message_size,
            idle_timeout: None,
        }
    }

    /// End connections that stay silent longer than `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Split a TCP stream and serve it.
    pub async fn handle_tcp(&self, stream: TcpStream, peer: SocketAddr) -> RemoteEnd {
        let (reader, writer) = stream.into_split();
        self.run(reader, Connection::new(peer, writer)).await
    }

    /// Register `connection`, relay everything read from `reader`, then
    /// deregister and close.
    pub async fn run<R>(&self, mut reader: R, connection: Connection) -> RemoteEnd
    where
        R: AsyncRead + Unpin,
    {
        let registration = self
            .registry
            .register(ConnectionClass::Remote, connection.clone());
        tracing::info!(peer = %connection.peer(), conn = %connection.id(), "Remote peer connected");

        let end = self.read_loop(&mut reader, &connection).await;
        match &end {
            RemoteEnd::Eof => {
                tracing::info!(peer = %connection.peer(), "Remote peer disconnected")
            }
            RemoteEnd::Lost(e) => {
                tracing::warn!(peer = %connection.peer(), error = %e, "Remote connection lost")
            }
            RemoteEnd::Idle(after) => {
                tracing::info!(peer = %connection.peer(), idle = ?after, "Closing idle remote connection")
            }
        }

        drop(registration);
        connection.close().await;
        end
    }

    async fn read_loop<R>(&self, reader: &mut R, connection: &Connection) -> RemoteEnd
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.max_message_size];
        loop {
            let read = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, reader.read(&mut buf)).await {
                    Ok(read) => read,
                    Err(_) => return RemoteEnd::Idle(limit),
                },
                None => reader.read(&mut buf).await,
            };

            match read {
                Ok(0) => return RemoteEnd::Eof,
                Ok(n) => self.relay_chunk(connection, &buf[..n]),
                Err(e) if stream_gone(&e) => return RemoteEnd::Lost(e),
                Err(e) => {
                    tracing::warn!(peer = %connection.peer(), error = %e, "Error reading from remote");
                }
            }
        }
    }

    fn relay_chunk(&self, connection: &Connection, chunk: &[u8]) {
        self.registry.broadcast(connection.id(), chunk);

        match self.codec.decode(chunk) {
            Ok(plaintext) => self.display.show(connection.peer(), &printable(&plaintext)),
            Err(e) => {
                metrics::record_decode_failure();
                tracing::warn!(peer = %connection.peer(), bytes = chunk.len(), error = %e, "Error decrypting message");
            }
        }
    }
}

/// Read errors after which the stream will never yield data again.
pub(crate) fn stream_gone(error: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        error.kind(),
        ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof | NotConnected
    )
}
