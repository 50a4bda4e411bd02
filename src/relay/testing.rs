//! Readers with scripted results for handler tests.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Yields each scripted chunk or error in turn, then EOF.
pub(crate) struct ScriptedReader {
    steps: VecDeque<io::Result<Vec<u8>>>,
}

impl ScriptedReader {
    pub(crate) fn new(steps: impl IntoIterator<Item = io::Result<Vec<u8>>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.steps.pop_front() {
            None => Poll::Ready(Ok(())),
            Some(Err(e)) => Poll::Ready(Err(e)),
            Some(Ok(chunk)) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.steps.push_front(Ok(chunk[n..].to_vec()));
                }
                Poll::Ready(Ok(()))
            }
        }
    }
}
