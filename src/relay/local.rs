//! Handler for the operator's plain-text session.
//!
//! Lines typed into the local session (usually `telnet localhost 10000`)
//! are echoed to the display, encrypted, and broadcast to every remote peer.
//! Lines are assembled with `read_until`, so their length is unbounded.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;

use crate::crypto::BlockCipherCodec;
use crate::net::connection::Connection;
use crate::relay::display::ChatDisplay;
use crate::relay::registry::{ConnectionClass, RegistryHandle};
use crate::relay::remote::stream_gone;

/// Serves one local session.
#[derive(Clone)]
pub struct LocalHandler {
    registry: RegistryHandle,
    codec: Arc<BlockCipherCodec>,
    display: Arc<dyn ChatDisplay>,
}

impl LocalHandler {
    pub fn new(
        registry: RegistryHandle,
        codec: Arc<BlockCipherCodec>,
        display: Arc<dyn ChatDisplay>,
    ) -> Self {
        Self {
            registry,
            codec,
            display,
        }
    }

    pub async fn handle_tcp(&self, stream: TcpStream, peer: SocketAddr) {
        let (reader, writer) = stream.into_split();
        self.run(reader, Connection::new(peer, writer)).await;
    }

    /// Register `connection` and send every line read from `reader`.
    ///
    /// Returns the number of lines sent.
    pub async fn run<R>(&self, reader: R, connection: Connection) -> usize
    where
        R: AsyncRead + Unpin,
    {
        let registration = self
            .registry
            .register(ConnectionClass::Local, connection.clone());
        tracing::info!(peer = %connection.peer(), conn = %connection.id(), "Local session started");

        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut sent = 0;

        loop {
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if self.send_line(&connection, &line) {
                        sent += 1;
                    }
                    line.clear();
                }
                Err(e) if stream_gone(&e) => {
                    tracing::warn!(peer = %connection.peer(), error = %e, "Local session lost");
                    break;
                }
                // bytes read before the error stay in `line`
                Err(e) => {
                    tracing::warn!(peer = %connection.peer(), error = %e, "Error reading local input");
                }
            }
        }

        if !line.is_empty() && self.send_line(&connection, &line) {
            sent += 1;
        }

        tracing::info!(peer = %connection.peer(), lines = sent, "Local session ended");
        drop(registration);
        connection.close().await;
        sent
    }

    fn send_line(&self, connection: &Connection, raw: &[u8]) -> bool {
        let text = trim_line_ending(raw);
        if text.is_empty() {
            return false;
        }

        self.display
            .show(connection.peer(), &String::from_utf8_lossy(text));

        let ciphertext = self.codec.encode(text);
        tracing::debug!(bytes = text.len(), encoded = ciphertext.len(), "Sending local line");
        self.registry.broadcast(connection.id(), ciphertext);
        true
    }
}

/// Strip one trailing `\n` or `\r\n`.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::display::{printable, RecordingDisplay};
    use crate::relay::testing::ScriptedReader;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    const KEY: &[u8] = b"0123456789abcdef";

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn codec() -> BlockCipherCodec {
        BlockCipherCodec::from_key(KEY).unwrap()
    }

    fn remote_pipe(registry: &RegistryHandle, port: u16) -> DuplexStream {
        let (ours, theirs) = tokio::io::duplex(1 << 20);
        registry.add_remote(Connection::new(addr(port), ours));
        theirs
    }

    async fn run_session(input: &[u8]) -> (usize, Vec<u8>, Arc<RecordingDisplay>) {
        let (mut typist, reader) = tokio::io::duplex(1 << 20);
        let input = input.to_vec();
        tokio::spawn(async move {
            typist.write_all(&input).await.unwrap();
        });
        run_reader(reader).await
    }

    async fn run_reader<R>(reader: R) -> (usize, Vec<u8>, Arc<RecordingDisplay>)
    where
        R: AsyncRead + Unpin,
    {
        let registry = RegistryHandle::spawn(None);
        let display = Arc::new(RecordingDisplay::new());
        let handler = LocalHandler::new(registry.clone(), Arc::new(codec()), display.clone());
        let mut remote = remote_pipe(&registry, 9000);
        let (writer, _echo) = tokio::io::duplex(64);

        let sent = timeout(
            Duration::from_secs(2),
            handler.run(reader, Connection::new(addr(10000), writer)),
        )
        .await
        .unwrap();

        // the registry still holds the remote; drop it so the pipe reaches EOF
        registry.remove_remote(
            registry.snapshot().await.unwrap().remotes[0],
        );
        drop(handler);
        drop(registry);

        let mut received = Vec::new();
        timeout(Duration::from_secs(2), remote.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        (sent, received, display)
    }

    #[test]
    fn trims_both_line_endings() {
        assert_eq!(trim_line_ending(b"hi\n"), b"hi");
        assert_eq!(trim_line_ending(b"hi\r\n"), b"hi");
        assert_eq!(trim_line_ending(b"hi"), b"hi");
        assert_eq!(trim_line_ending(b"\n"), b"");
    }

    #[tokio::test]
    async fn each_line_is_encrypted_and_broadcast() {
        let (sent, received, display) = run_session(b"hello\r\nworld\n").await;
        assert_eq!(sent, 2);
        assert_eq!(display.texts(), vec!["hello", "world"]);

        let mut expected = codec().encode(b"hello");
        expected.extend(codec().encode(b"world"));
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let (sent, received, _) = run_session(b"\n\r\nhi\n\n").await;
        assert_eq!(sent, 1);
        assert_eq!(received, codec().encode(b"hi"));
    }

    #[tokio::test]
    async fn unterminated_final_line_is_sent() {
        let (sent, received, display) = run_session(b"first\nlast words").await;
        assert_eq!(sent, 2);
        assert_eq!(display.texts(), vec!["first", "last words"]);
        let decoded = codec().decode(&received).unwrap();
        assert_eq!(printable(&decoded[16..]), "last words");
    }

    #[tokio::test]
    async fn very_long_line_arrives_whole() {
        let long: Vec<u8> = (0..100_000).map(|i| b'a' + (i % 26) as u8).collect();
        let mut input = long.clone();
        input.push(b'\n');

        let (sent, received, _) = run_session(&input).await;
        assert_eq!(sent, 1);
        assert_eq!(received.len(), 100_000usize.div_ceil(16) * 16);
        let decoded = codec().decode(&received).unwrap();
        assert_eq!(printable(&decoded).as_bytes(), &long[..]);
    }

    #[tokio::test]
    async fn read_error_mid_line_keeps_partial_input() {
        let reader = ScriptedReader::new([
            Ok(b"hel".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "hiccup")),
            Ok(b"lo\n".to_vec()),
            Ok(b"again\n".to_vec()),
        ]);

        let (sent, received, display) = run_reader(reader).await;
        assert_eq!(sent, 2);
        assert_eq!(display.texts(), vec!["hello", "again"]);

        let mut expected = codec().encode(b"hello");
        expected.extend(codec().encode(b"again"));
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn local_origin_is_not_echoed_back() {
        let registry = RegistryHandle::spawn(None);
        let display = Arc::new(RecordingDisplay::new());
        let handler = LocalHandler::new(registry.clone(), Arc::new(codec()), display);

        let (mut typist, reader) = tokio::io::duplex(64);
        let (writer, mut echo) = tokio::io::duplex(64);
        typist.write_all(b"ping\n").await.unwrap();
        drop(typist);

        handler.run(reader, Connection::new(addr(10000), writer)).await;
        let mut back = Vec::new();
        echo.read_to_end(&mut back).await.unwrap();
        assert!(back.is_empty());
    }
}
