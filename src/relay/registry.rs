//! Connection registry actor.
//!
//! # Responsibilities
//! - Own the local and remote connection sets
//! - Apply add/remove requests in arrival order
//! - Fan broadcast payloads out to every remote except the origin
//! - Evict remotes whose write fails
//!
//! # Design Decisions
//! - One task owns the sets; everything else talks to it over a channel, so
//!   mutations and broadcasts are linearized without locks
//! - The command channel is unbounded so registration guards can enqueue
//!   their removal from `Drop`
//! - Each recipient write runs on its own task; a stalled peer delays only
//!   itself
//! - Write failures re-enter the loop as commands, which makes eviction
//!   ordered with respect to everything else

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::net::connection::{Connection, ConnectionId};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

/// The two disjoint connection classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    /// The operator's own plain-text session.
    Local,
    /// An encrypted peer reached over the network.
    Remote,
}

impl ConnectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionClass::Local => "local",
            ConnectionClass::Remote => "remote",
        }
    }
}

impl std::fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk to deliver to every remote connection except `origin`.
#[derive(Debug, Clone)]
pub struct RelayMessage {
    /// Sender; never receives its own payload.
    pub origin: ConnectionId,
    /// Bytes forwarded verbatim.
    pub payload: Arc<[u8]>,
}

/// Point-in-time view of registry membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub locals: Vec<ConnectionId>,
    pub remotes: Vec<ConnectionId>,
}

impl RegistrySnapshot {
    pub fn contains_remote(&self, id: ConnectionId) -> bool {
        self.remotes.contains(&id)
    }

    pub fn contains_local(&self, id: ConnectionId) -> bool {
        self.locals.contains(&id)
    }
}

enum RegistryCommand {
    Add(ConnectionClass, Connection),
    Remove(ConnectionClass, ConnectionId),
    Broadcast(RelayMessage),
    ReportWriteError {
        connection: ConnectionId,
        peer: SocketAddr,
        error: std::io::Error,
    },
    Snapshot {
        reply: oneshot::Sender<RegistrySnapshot>,
    },
}

/// Handle to the registry actor. Cheap to clone.
///
/// The actor runs until every handle has been dropped.
#[derive(Clone)]
pub struct RegistryHandle {
    cmd_tx: mpsc::UnboundedSender<RegistryCommand>,
}

impl std::fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("closed", &self.cmd_tx.is_closed())
            .finish()
    }
}

impl RegistryHandle {
    /// Spawn the registry actor on the current runtime.
    ///
    /// `write_timeout` bounds each broadcast write; `None` waits forever.
    pub fn spawn(write_timeout: Option<Duration>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

        let actor = RegistryActor {
            locals: Vec::new(),
            remotes: Vec::new(),
            write_timeout,
            feedback_tx,
        };
        tokio::spawn(actor.run(cmd_rx, feedback_rx));

        tracing::debug!(?write_timeout, "Registry actor started");
        Self { cmd_tx }
    }

    fn send(&self, cmd: RegistryCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::debug!("Registry actor closed; dropping command");
        }
    }

    pub fn add_local(&self, connection: Connection) {
        self.send(RegistryCommand::Add(ConnectionClass::Local, connection));
    }

    pub fn add_remote(&self, connection: Connection) {
        self.send(RegistryCommand::Add(ConnectionClass::Remote, connection));
    }

    /// Remove a local connection; absent ids are ignored.
    pub fn remove_local(&self, id: ConnectionId) {
        self.send(RegistryCommand::Remove(ConnectionClass::Local, id));
    }

    /// Remove a remote connection; absent ids are ignored.
    pub fn remove_remote(&self, id: ConnectionId) {
        self.send(RegistryCommand::Remove(ConnectionClass::Remote, id));
    }

    /// Queue `payload` for every remote except `origin`.
    pub fn broadcast(&self, origin: ConnectionId, payload: impl Into<Arc<[u8]>>) {
        self.send(RegistryCommand::Broadcast(RelayMessage {
            origin,
            payload: payload.into(),
        }));
    }

    /// Report a failed write to `connection`, evicting it from the remotes.
    pub fn report_write_error(&self, connection: &Connection, error: std::io::Error) {
        self.send(RegistryCommand::ReportWriteError {
            connection: connection.id(),
            peer: connection.peer(),
            error,
        });
    }

    /// Current membership, or `None` if the actor has stopped.
    pub async fn snapshot(&self) -> Option<RegistrySnapshot> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx.send(RegistryCommand::Snapshot { reply }).ok()?;
        rx.await.ok()
    }

    /// Add `connection` to `class` and return a guard that removes it again
    /// when dropped.
    pub fn register(&self, class: ConnectionClass, connection: Connection) -> Registration {
        self.send(RegistryCommand::Add(class, connection.clone()));
        Registration {
            registry: self.clone(),
            class,
            id: connection.id(),
        }
    }
}

/// Membership held for the lifetime of a handler.
///
/// Dropping it queues exactly one removal, whichever way the handler exits.
#[derive(Debug)]
pub struct Registration {
    registry: RegistryHandle,
    class: ConnectionClass,
    id: ConnectionId,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn class(&self) -> ConnectionClass {
        self.class
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .send(RegistryCommand::Remove(self.class, self.id));
    }
}

struct RegistryActor {
    locals: Vec<Connection>,
    remotes: Vec<Connection>,
    write_timeout: Option<Duration>,
    feedback_tx: mpsc::UnboundedSender<RegistryCommand>,
}

impl RegistryActor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<RegistryCommand>,
        mut feedback_rx: mpsc::UnboundedReceiver<RegistryCommand>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(cmd) = feedback_rx.recv() => self.handle(cmd),
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }
        tracing::debug!("Registry actor stopped");
    }

    fn handle(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Add(class, connection) => self.add(class, connection),
            RegistryCommand::Remove(class, id) => {
                self.remove(class, id);
            }
            RegistryCommand::Broadcast(message) => self.broadcast(message),
            RegistryCommand::ReportWriteError {
                connection,
                peer,
                error,
            } => {
                tracing::warn!(conn = %connection, peer = %peer, error = %error, "Error writing ciphertext to remote");
                if self.remove(ConnectionClass::Remote, connection) {
                    metrics::record_eviction();
                    tracing::info!(conn = %connection, peer = %peer, "Evicted remote after failed write");
                }
            }
            RegistryCommand::Snapshot { reply } => {
                let _ = reply.send(RegistrySnapshot {
                    locals: self.locals.iter().map(Connection::id).collect(),
                    remotes: self.remotes.iter().map(Connection::id).collect(),
                });
            }
        }
    }

    fn set_mut(&mut self, class: ConnectionClass) -> &mut Vec<Connection> {
        match class {
            ConnectionClass::Local => &mut self.locals,
            ConnectionClass::Remote => &mut self.remotes,
        }
    }

    fn add(&mut self, class: ConnectionClass, connection: Connection) {
        let already = self
            .locals
            .iter()
            .chain(self.remotes.iter())
            .any(|c| *c == connection);
        if already {
            tracing::warn!(conn = %connection.id(), class = %class, "Connection already registered; ignoring add");
            return;
        }

        tracing::debug!(conn = %connection.id(), peer = %connection.peer(), class = %class, "Adding to routing table");
        let set = self.set_mut(class);
        set.push(connection);
        let count = set.len();
        metrics::record_registered(class.as_str(), count);
    }

    /// Returns whether the connection was present.
    fn remove(&mut self, class: ConnectionClass, id: ConnectionId) -> bool {
        let set = self.set_mut(class);
        let Some(index) = set.iter().position(|c| c.id() == id) else {
            tracing::trace!(conn = %id, class = %class, "Remove of absent connection ignored");
            return false;
        };
        set.remove(index);
        let count = set.len();
        metrics::record_registered(class.as_str(), count);
        tracing::debug!(conn = %id, class = %class, remaining = count, "Removed from routing table");
        true
    }

    fn broadcast(&mut self, message: RelayMessage) {
        let targets: Vec<Connection> = self
            .remotes
            .iter()
            .filter(|c| c.id() != message.origin)
            .cloned()
            .collect();

        metrics::record_broadcast(targets.len());
        tracing::debug!(
            origin = %message.origin,
            bytes = message.payload.len(),
            recipients = targets.len(),
            "Writing to remotes"
        );

        for connection in targets {
            let payload = Arc::clone(&message.payload);
            let feedback = self.feedback_tx.clone();
            let deadline = self.write_timeout;
            tokio::spawn(async move {
                match with_deadline(deadline, connection.write(&payload)).await {
                    Ok(()) => {
                        metrics::record_broadcast_write(true, payload.len());
                        tracing::trace!(conn = %connection.id(), bytes = payload.len(), "Delivered");
                    }
                    Err(_) if connection.is_closed() => {
                        metrics::record_broadcast_write(false, 0);
                        tracing::debug!(conn = %connection.id(), "Write abandoned, connection closed");
                    }
                    Err(error) => {
                        metrics::record_broadcast_write(false, 0);
                        let _ = feedback.send(RegistryCommand::ReportWriteError {
                            connection: connection.id(),
                            peer: connection.peer(),
                            error,
                        });
                    }
                }
            });
        }
    }
}
