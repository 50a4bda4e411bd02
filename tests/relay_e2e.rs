//! End-to-end relay tests over real TCP sockets.

use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

mod common;

use common::{assert_silent, codec, read_exactly, start_node, wait_for};

#[tokio::test]
async fn test_local_line_reaches_every_remote() {
    let server = start_node(common::server_config(4)).await;

    let mut a = TcpStream::connect(server.remote_addr).await.unwrap();
    let mut b = TcpStream::connect(server.remote_addr).await.unwrap();
    wait_for(&server.registry, |s| s.remotes.len() == 2).await;

    let mut local = TcpStream::connect(server.local_addr).await.unwrap();
    local.write_all(b"hello\n").await.unwrap();

    let expected = codec().encode(b"hello");
    assert_eq!(expected.len(), 16);
    assert_eq!(read_exactly(&mut a, 16).await, expected);
    assert_eq!(read_exactly(&mut b, 16).await, expected);

    // A's ciphertext goes to B verbatim and never back to A
    let hi = codec().encode(b"hi");
    a.write_all(&hi).await.unwrap();
    assert_eq!(read_exactly(&mut b, hi.len()).await, hi);
    assert_silent(&mut a).await;

    // the local session gets no relay traffic; the display shows both lines
    assert_silent(&mut local).await;
    common::eventually(|| server.display.texts().len() == 2).await;
    assert_eq!(server.display.texts(), vec!["hello", "hi"]);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_garbage_is_relayed_but_not_displayed() {
    let server = start_node(common::server_config(4)).await;

    let mut a = TcpStream::connect(server.remote_addr).await.unwrap();
    let mut b = TcpStream::connect(server.remote_addr).await.unwrap();
    wait_for(&server.registry, |s| s.remotes.len() == 2).await;

    a.write_all(b"not a block").await.unwrap();
    assert_eq!(read_exactly(&mut b, 11).await, b"not a block");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.display.texts().is_empty());

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_disconnected_remote_is_removed() {
    let server = start_node(common::server_config(4)).await;

    let mut a = TcpStream::connect(server.remote_addr).await.unwrap();
    let b = TcpStream::connect(server.remote_addr).await.unwrap();
    let mut c = TcpStream::connect(server.remote_addr).await.unwrap();
    wait_for(&server.registry, |s| s.remotes.len() == 3).await;

    drop(b);
    wait_for(&server.registry, |s| s.remotes.len() == 2).await;

    let msg = codec().encode(b"still here");
    a.write_all(&msg).await.unwrap();
    assert_eq!(read_exactly(&mut c, msg.len()).await, msg);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_client_node_bridges_to_server() {
    let server = start_node(common::server_config(4)).await;
    let mut watcher = TcpStream::connect(server.remote_addr).await.unwrap();
    wait_for(&server.registry, |s| s.remotes.len() == 1).await;

    let client = start_node(common::client_config(server.remote_addr)).await;
    wait_for(&server.registry, |s| s.remotes.len() == 2).await;
    wait_for(&client.registry, |s| s.remotes.len() == 1).await;

    let mut local = TcpStream::connect(client.local_addr).await.unwrap();
    local.write_all(b"over the bridge\r\n").await.unwrap();

    let expected = codec().encode(b"over the bridge");
    assert_eq!(read_exactly(&mut watcher, expected.len()).await, expected);
    common::eventually(|| server.display.texts() == vec!["over the bridge"]).await;
    assert_eq!(client.display.texts(), vec!["over the bridge"]);

    // and back: the watcher's message reaches the client node's screen
    let reply = codec().encode(b"received");
    watcher.write_all(&reply).await.unwrap();
    common::eventually(|| client.display.texts().len() == 2).await;
    assert_eq!(client.display.texts()[1], "received");

    client.shutdown.trigger();
    server.shutdown.trigger();
}

#[tokio::test]
async fn test_client_node_stops_when_bridge_closes() {
    let fake_server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = fake_server.local_addr().unwrap();

    let client = start_node(common::client_config(addr)).await;
    let (conn, _) = fake_server.accept().await.unwrap();
    drop(conn);

    let result = tokio::time::timeout(Duration::from_secs(2), client.task)
        .await
        .expect("client node kept running")
        .unwrap();
    assert!(result.is_ok());
}
