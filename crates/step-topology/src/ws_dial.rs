//! Outbound peer RPC dial: a client-side WebSocket connect carrying the
//! dialer's zone and service name as two `X-Rpc-Service-Name` header values,
//! mirroring `app/rpc_conn.go`'s `dial`, which builds the same two-value
//! `X-My-Rpc-Service-Name` header and calls `websocket.DefaultDialer.Dial`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use step_runtime::{BoxedReader, BoxedWriter};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsByteReader {
    inner: SplitStream<WsStream>,
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

struct WsByteWriter {
    inner: SplitSink<WsStream, Message>,
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

/// Dials `addr` as a WebSocket client, appending the zone/service name pair
/// as two `X-Rpc-Service-Name` header values so the peer's acceptor
/// classifies this as a sibling RPC connection rather than a client.
pub async fn dial_peer(addr: &str, zone_name: &str, service_name: &str) -> std::io::Result<(BoxedReader, BoxedWriter)> {
    let url = format!("ws://{addr}/ws");
    let mut request = url
        .into_client_request()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let headers = request.headers_mut();
    headers.append(
        "x-rpc-service-name",
        zone_name.parse().map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid zone name"))?,
    );
    headers.append(
        "x-rpc-service-name",
        service_name
            .parse()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid service name"))?,
    );

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e.to_string()))?;

    let (sink, source) = stream.split();
    let reader = WsByteReader { inner: source, pending: Vec::new(), pos: 0 };
    let writer = WsByteWriter { inner: sink };
    Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
}
