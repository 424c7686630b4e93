//! Bridges an axum WebSocket connection into the byte-stream abstraction the
//! framed RPC/client codecs expect, mirroring how the original treats a
//! `gorilla/websocket` connection as a plain ReadWriter in `rpc_conn.go`'s
//! `work` loop: binary messages in, binary messages out, one per write call.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use step_runtime::{BoxedReader, BoxedWriter};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Adapts the receive half of a WebSocket into `AsyncRead`, doling out one
/// binary message's bytes at a time and buffering whatever the caller's
/// read buffer couldn't take in a single call.
struct WsByteReader {
    inner: SplitStream<WebSocket>,
    pending: Vec<u8>,
    pos: usize,
}

impl AsyncRead for WsByteReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        loop {
            if self.pos < self.pending.len() {
                let n = (self.pending.len() - self.pos).min(buf.remaining());
                let start = self.pos;
                buf.put_slice(&self.pending[start..start + n]);
                self.pos += n;
                return Poll::Ready(Ok(()));
            }

            match self.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(Message::Binary(data)))) => {
                    self.pending = data.into();
                    self.pos = 0;
                }
                Poll::Ready(Some(Ok(Message::Close(_)))) | Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Ready(Some(Ok(_))) => continue,
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Adapts the send half of a WebSocket into `AsyncWrite`, wrapping each
/// write call's bytes in a single binary message.
struct WsByteWriter {
    inner: SplitSink<WebSocket, Message>,
}

impl AsyncWrite for WsByteWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.inner.poll_ready_unpin(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => {
                return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
            }
            Poll::Pending => return Poll::Pending,
        }
        match self.inner.start_send_unpin(Message::Binary(buf.to_vec().into())) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(e) => Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.poll_flush_unpin(cx).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.poll_close_unpin(cx).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

/// Splits an accepted WebSocket into the boxed reader/writer halves the
/// Channel/RPC fabric and the client read loop already know how to drive.
pub fn split_ws(socket: WebSocket) -> (BoxedReader, BoxedWriter) {
    let (sink, stream) = socket.split();
    let reader = WsByteReader { inner: stream, pending: Vec::new(), pos: 0 };
    let writer = WsByteWriter { inner: sink };
    (Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter)
}
