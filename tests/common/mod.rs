//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lanchat::config::ChatConfig;
use lanchat::crypto::{BlockCipherCodec, SharedSecret};
use lanchat::lifecycle::{ChatNode, NodeError, RunningNode, Shutdown};
use lanchat::net::ConnectionTracker;
use lanchat::relay::{RecordingDisplay, RegistryHandle, RegistrySnapshot};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const SECRET: &[u8] = b"0123456789abcdef";

pub fn secret() -> SharedSecret {
    SharedSecret::new(SECRET.to_vec()).unwrap()
}

pub fn codec() -> BlockCipherCodec {
    BlockCipherCodec::new(&secret()).unwrap()
}

/// Server config bound to ephemeral loopback ports.
pub fn server_config(max_remotes: usize) -> ChatConfig {
    let mut config = ChatConfig::default();
    config.mode.serve = true;
    config.remote.bind_address = "127.0.0.1:0".into();
    config.remote.max_connections = max_remotes;
    config.local.bind_address = "127.0.0.1:0".into();
    config
}

/// Client config dialing `server`.
pub fn client_config(server: SocketAddr) -> ChatConfig {
    let mut config = ChatConfig::default();
    config.mode.server_address = Some(server.to_string());
    config.local.bind_address = "127.0.0.1:0".into();
    config
}

/// A node running on its own task.
pub struct TestNode {
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub registry: RegistryHandle,
    pub display: Arc<RecordingDisplay>,
    pub shutdown: Shutdown,
    pub remote_tracker: Option<ConnectionTracker>,
    pub task: JoinHandle<Result<(), NodeError>>,
}

pub async fn start_node(config: ChatConfig) -> TestNode {
    let display = Arc::new(RecordingDisplay::new());
    let node: RunningNode = ChatNode::new(config, &secret(), display.clone())
        .unwrap()
        .bind()
        .await
        .unwrap();

    let remote_addr = node.remote_addr().unwrap();
    let local_addr = node.local_addr().unwrap();
    let registry = node.registry();
    let remote_tracker = node.remote_tracker();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(node.run(shutdown.clone()));

    TestNode {
        remote_addr,
        local_addr,
        registry,
        display,
        shutdown,
        remote_tracker,
        task,
    }
}

/// Poll the registry until `pred` holds.
pub async fn wait_for<F>(registry: &RegistryHandle, pred: F) -> RegistrySnapshot
where
    F: Fn(&RegistrySnapshot) -> bool,
{
    for _ in 0..200 {
        if let Some(snap) = registry.snapshot().await {
            if pred(&snap) {
                return snap;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry never reached expected state");
}

/// Poll until `cond` holds.
pub async fn eventually<F>(cond: F)
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

pub async fn read_exactly<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(Duration::from_secs(2), reader.read_exact(&mut buf))
        .await
        .expect("timed out waiting for data")
        .expect("read failed");
    buf
}

/// Assert nothing arrives within a short window.
pub async fn assert_silent<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1];
    let res = timeout(Duration::from_millis(150), reader.read(&mut buf)).await;
    assert!(res.is_err(), "expected no data, got {:?}", res);
}
