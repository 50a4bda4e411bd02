//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration and key the codec
//! - Spawn the registry and build the handlers
//! - Bind the local listener and either bind the remote listener (server)
//!   or dial the server (client)
//! - Serve until shutdown, or until the bridge ends in client mode
//!
//! # Design Decisions
//! - Fail fast: every startup error is fatal and surfaces as `NodeError`
//! - Binding happens in `bind`, serving in `run`, so callers (and tests) learn
//!   the bound addresses before any traffic flows
//! - Per-connection failures never leave their handler

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::{validate_config, ChatConfig, Protocol, ValidationError};
use crate::crypto::{BlockCipherCodec, KeyError, SharedSecret};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{AdmissionListener, BridgeConnector, BridgeError, ConnectionTracker, ListenerError};
use crate::relay::{ChatDisplay, LocalHandler, RegistryHandle, RemoteHandler};
use crate::resilience::timeouts::from_secs;

/// Fatal node errors.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid shared secret: {0}")]
    Key(#[from] KeyError),

    #[error("invalid configuration: {}", join(.0))]
    Config(Vec<ValidationError>),

    #[error("protocol '{0}' is not implemented; use tcp")]
    UnsupportedProtocol(Protocol),

    #[error("{role} listener on {address}: {source}")]
    Listener {
        role: &'static str,
        address: String,
        #[source]
        source: ListenerError,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A configured, keyed node that has not bound any socket yet.
pub struct ChatNode {
    config: ChatConfig,
    codec: Arc<BlockCipherCodec>,
    display: Arc<dyn ChatDisplay>,
}

impl ChatNode {
    pub fn new(
        config: ChatConfig,
        secret: &SharedSecret,
        display: Arc<dyn ChatDisplay>,
    ) -> Result<Self, NodeError> {
        validate_config(&config).map_err(NodeError::Config)?;
        if config.mode.protocol != Protocol::Tcp {
            return Err(NodeError::UnsupportedProtocol(config.mode.protocol));
        }
        let codec = BlockCipherCodec::new(secret)?;
        tracing::debug!(?codec, "Codec ready");

        Ok(Self {
            config,
            codec: Arc::new(codec),
            display,
        })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Spawn the registry, bind listeners, and connect the bridge if needed.
    pub async fn bind(self) -> Result<RunningNode, NodeError> {
        let config = &self.config;
        let registry = RegistryHandle::spawn(from_secs(config.timeouts.write_secs));

        let remote_handler = RemoteHandler::new(
            registry.clone(),
            Arc::clone(&self.codec),
            Arc::clone(&self.display),
            config.relay.max_message_size,
        )
        .with_idle_timeout(from_secs(config.timeouts.idle_secs));
        let local_handler = LocalHandler::new(
            registry.clone(),
            Arc::clone(&self.codec),
            Arc::clone(&self.display),
        );

        let remote = if config.mode.serve {
            let listener = bind_listener(
                "remote",
                &config.remote.bind_address,
                config.remote.max_connections,
            )
            .await?;
            RemoteSide::Server(listener)
        } else {
            // validation guarantees an address in client mode
            let address = config.mode.server_address.clone().unwrap_or_default();
            let bridge = BridgeConnector::new(
                address,
                &config.bridge,
                from_secs(config.timeouts.connect_secs),
            );
            let (stream, peer) = bridge.connect().await?;
            RemoteSide::Bridge {
                bridge,
                stream,
                peer,
            }
        };

        let local = bind_listener(
            "local",
            &config.local.bind_address,
            config.local.max_connections,
        )
        .await?;

        Ok(RunningNode {
            registry,
            remote_handler,
            local_handler,
            remote,
            local,
        })
    }
}

async fn bind_listener(
    role: &'static str,
    address: &str,
    max_connections: usize,
) -> Result<AdmissionListener, NodeError> {
    AdmissionListener::bind(address, max_connections, role)
        .await
        .map_err(|source| NodeError::Listener {
            role,
            address: address.to_string(),
            source,
        })
}

enum RemoteSide {
    Server(AdmissionListener),
    Bridge {
        bridge: BridgeConnector,
        stream: TcpStream,
        peer: SocketAddr,
    },
}

/// A node with its sockets bound, ready to serve.
pub struct RunningNode {
    registry: RegistryHandle,
    remote_handler: RemoteHandler,
    local_handler: LocalHandler,
    remote: RemoteSide,
    local: AdmissionListener,
}

impl RunningNode {
    /// Address of the local plain-text listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local.local_addr().ok()
    }

    /// Address of the remote listener (server) or of the server dialed (client).
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        match &self.remote {
            RemoteSide::Server(listener) => listener.local_addr().ok(),
            RemoteSide::Bridge { peer, .. } => Some(*peer),
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self.remote, RemoteSide::Server(_))
    }

    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Handler counters for the remote listener; `None` in client mode.
    pub fn remote_tracker(&self) -> Option<ConnectionTracker> {
        match &self.remote {
            RemoteSide::Server(listener) => Some(listener.tracker()),
            RemoteSide::Bridge { .. } => None,
        }
    }

    /// Serve until `shutdown` fires. In client mode the node also stops when
    /// the bridged connection ends.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), NodeError> {
        let RunningNode {
            registry,
            remote_handler,
            local_handler,
            remote,
            local,
        } = self;

        let local_task = tokio::spawn(local.serve(
            move |stream, peer| {
                let handler = local_handler.clone();
                async move { handler.handle_tcp(stream, peer).await }
            },
            shutdown.signalled(),
        ));

        match remote {
            RemoteSide::Server(listener) => {
                let address = listener
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                listener
                    .serve(
                        move |stream, peer| {
                            let handler = remote_handler.clone();
                            async move {
                                handler.handle_tcp(stream, peer).await;
                            }
                        },
                        shutdown.signalled(),
                    )
                    .await
                    .map_err(|source| NodeError::Listener {
                        role: "remote",
                        address,
                        source,
                    })?;
            }
            RemoteSide::Bridge {
                bridge,
                stream,
                peer,
            } => {
                tokio::select! {
                    end = bridge.drive(stream, peer, &remote_handler) => {
                        tracing::warn!(server = %peer, reason = ?end, "Disconnected from server");
                    }
                    _ = shutdown.wait() => {}
                }
            }
        }

        shutdown.trigger();
        match local_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Local listener failed"),
            Err(e) => tracing::error!(error = %e, "Local listener task panicked"),
        }

        if let Some(snapshot) = registry.snapshot().await {
            tracing::info!(
                locals = snapshot.locals.len(),
                remotes = snapshot.remotes.len(),
                "Node stopped"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RecordingDisplay;

    fn secret() -> SharedSecret {
        SharedSecret::new(b"0123456789abcdef".to_vec()).unwrap()
    }

    fn server_config() -> ChatConfig {
        let mut config = ChatConfig::default();
        config.mode.serve = true;
        config.remote.bind_address = "127.0.0.1:0".into();
        config.local.bind_address = "127.0.0.1:0".into();
        config
    }

    #[test]
    fn websocket_is_rejected() {
        let mut config = server_config();
        config.mode.protocol = Protocol::Ws;
        let err = ChatNode::new(config, &secret(), Arc::new(RecordingDisplay::new()))
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::UnsupportedProtocol(Protocol::Ws)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ChatConfig::default();
        let err = ChatNode::new(config, &secret(), Arc::new(RecordingDisplay::new()))
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::Config(_)));
        assert!(err.to_string().contains("server address required"));
    }

    #[tokio::test]
    async fn server_binds_and_stops_on_shutdown() {
        let node = ChatNode::new(server_config(), &secret(), Arc::new(RecordingDisplay::new()))
            .unwrap()
            .bind()
            .await
            .unwrap();
        assert!(node.is_server());
        assert!(node.local_addr().is_some());
        assert_ne!(node.remote_addr().unwrap().port(), 0);

        let shutdown = Shutdown::new();
        let task = tokio::spawn(node.run(shutdown.clone()));
        shutdown.trigger();
        let result = tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn client_without_server_fails_to_bind() {
        let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = probe.local_addr().unwrap().to_string();
        drop(probe);

        let mut config = server_config();
        config.mode.serve = false;
        config.mode.server_address = Some(address);
        let node = ChatNode::new(config, &secret(), Arc::new(RecordingDisplay::new())).unwrap();
        let err = node.bind().await.err().unwrap();
        assert!(matches!(err, NodeError::Bridge(_)));
    }
}
