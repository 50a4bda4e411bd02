//! TCP listener implementation with admission control.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Dispatch each connection to its handler on its own task
//! - Graceful handling of accept errors
//!
//! # Design Decisions
//! - A slot is acquired *before* `accept`: once the limit is reached the
//!   listener stops accepting and new peers wait in the kernel backlog
//! - The permit moves into the handler task and is released on drop, so every
//!   exit path (including a panic) frees the slot

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::net::connection::ConnectionTracker;
use crate::observability::metrics;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The admission semaphore was closed.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Admission semaphore closed"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
            ListenerError::Closed => None,
        }
    }
}

/// A bounded TCP listener that limits concurrent handlers.
pub struct AdmissionListener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent handlers.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
    /// Label used in logs and metrics ("remote" / "local").
    class: &'static str,
    /// Running handler count.
    tracker: ConnectionTracker,
}

impl AdmissionListener {
    /// Resolve `address` and bind with the given connection limit.
    pub async fn bind(
        address: &str,
        max_connections: usize,
        class: &'static str,
    ) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            class,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            class,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Waits for a free slot first, then for a peer. The returned permit must
    /// be held for the handler's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            class = self.class,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Accept connections until `shutdown` resolves, running `handler` for
    /// each one on its own task.
    ///
    /// Accept errors are logged and the loop keeps going.
    pub async fn serve<H, Fut, S>(self, handler: H, shutdown: S) -> Result<(), ListenerError>
    where
        H: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.accept() => {
                    match result {
                        Ok((stream, addr, permit)) => {
                            metrics::record_connection_opened(self.class);
                            let handler = Arc::clone(&handler);
                            let guard = self.tracker.track();
                            let class = self.class;
                            tokio::spawn(async move {
                                let _permit = permit;
                                let _guard = guard;
                                handler(stream, addr).await;
                                tracing::debug!(peer = %addr, class, "Handler returned");
                            });
                        }
                        Err(ListenerError::Accept(e)) => {
                            tracing::error!(class = self.class, error = %e, "Error accepting TCP traffic");
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!(class = self.class, "Listener received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Handle on the running-handler counters.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the slot is released back to the listener.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
