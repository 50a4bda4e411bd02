//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for identity and tracing
//! - Wrap the write half of a peer stream in a cheap, shareable handle
//! - Count active handlers per listener

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Boxed write half of a peer stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shareable handle to one peer.
///
/// Clones refer to the same peer and compare equal. Writes are serialized
/// through an async mutex so payloads from concurrent broadcasts never
/// interleave on the wire. Closing does not wait for that mutex: it flips
/// a watch flag that every pending and future write observes.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    writer: Arc<Mutex<BoxedWriter>>,
    closed: Arc<watch::Sender<bool>>,
}

impl Connection {
    /// Wrap a writer for the peer at `peer`.
    pub fn new<W>(peer: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            peer,
            writer: Arc::new(Mutex::new(Box::new(writer))),
            closed: Arc::new(closed),
        }
    }

    /// Identity used for registry membership.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address of the peer.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write the whole payload and flush it.
    ///
    /// Fails with `ConnectionAborted` if the connection is closed before or
    /// while the write is in progress.
    pub async fn write(&self, payload: &[u8]) -> std::io::Result<()> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(closed_error());
        }

        tokio::select! {
            biased;
            _ = async { let _ = closed.wait_for(|closed| *closed).await; } => Err(closed_error()),
            result = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(payload).await?;
                writer.flush().await
            } => result,
        }
    }

    /// Shut down the write direction.
    ///
    /// Never waits behind an in-flight write: pending writes are aborted and
    /// the shutdown is skipped if the writer is still busy. Errors are
    /// ignored; the peer may already be gone.
    pub async fn close(&self) {
        self.closed.send_replace(true);
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
    }

    /// Whether `close` has been called on any clone.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

fn closed_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "connection closed")
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Counts handler instances that are currently running.
///
/// The peak is kept so tests and status logs can confirm the admission bound.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active handler. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ConnectionGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Handlers currently running.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of handlers ever running at once.
    pub fn peak_count(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a handler's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn clones_share_identity() {
        let (a, _b) = tokio::io::duplex(64);
        let conn = Connection::new(addr(), a);
        let clone = conn.clone();
        assert_eq!(conn, clone);

        let (c, _d) = tokio::io::duplex(64);
        assert_ne!(conn, Connection::new(addr(), c));
    }

    #[tokio::test]
    async fn write_reaches_peer() {
        let (a, mut b) = tokio::io::duplex(64);
        let conn = Connection::new(addr(), a);
        conn.write(b"ping").await.unwrap();
        conn.close().await;

        let mut buf = Vec::new();
        b.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"ping");
    }

    #[tokio::test]
    async fn close_aborts_a_stalled_write() {
        // nothing drains `_far`, so the write blocks once 4 bytes are buffered
        let (a, _far) = tokio::io::duplex(4);
        let conn = Connection::new(addr(), a);

        let writing = conn.clone();
        let write = tokio::spawn(async move { writing.write(&[0u8; 64]).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!write.is_finished());

        tokio::time::timeout(std::time::Duration::from_secs(1), conn.close())
            .await
            .expect("close waited for the stalled write");
        assert!(conn.is_closed());

        let err = tokio::time::timeout(std::time::Duration::from_secs(1), write)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionAborted);
    }

    #[tokio::test]
    async fn write_after_close_fails() {
        let (a, _b) = tokio::io::duplex(64);
        let conn = Connection::new(addr(), a);
        conn.close().await;

        let err = conn.write(b"late").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn tracker_counts_and_keeps_peak() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let g1 = tracker.track();
        let g2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(g1);
        assert_eq!(tracker.active_count(), 1);
        drop(g2);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.peak_count(), 2);
    }
}
