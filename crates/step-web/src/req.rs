//! Client connection handling: a 90-second idle-reaping read loop over the
//! client-request frame plus a code-keyed handler table, kept separate from
//! the Channel/RPC fabric. Grounded on `app/req_conn.go`'s `ReqConn.work`
//! (read loop with a refreshed read deadline) and `doRequest` (code-keyed
//! table with a default slot), and `app/app.go`'s `reqHandlers`/
//! `defaultReqHandler`/`cnnlostReqHandler` globals, turned into plain data
//! held by a `ReqDispatch` value instead of package globals.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use step_runtime::{BoxedReader, BoxedWriter};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

pub const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Write deadline for a single outbound message, matching `ReqConn.SendWithTimeout`'s
/// default in the original.
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors a business handler may see when pushing a message back to a client.
#[derive(Debug)]
pub enum SendError {
    Disconnected,
    Timeout,
    Io(std::io::Error),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "client connection has no writer installed"),
            SendError::Timeout => write!(f, "write timed out"),
            SendError::Io(e) => write!(f, "write error: {e}"),
        }
    }
}

impl std::error::Error for SendError {}

pub type ReqFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type ReqHandler = Arc<dyn Fn(Arc<ClientConn>, u16, Vec<u8>) -> ReqFuture + Send + Sync>;
pub type ConnLostHandler = Arc<dyn Fn(Arc<ClientConn>) -> ReqFuture + Send + Sync>;

/// Per-socket state for an inbound client connection: a name, a connected
/// flag, and a free-form session map business handlers may stash data in
/// (`ReqConn.session` in the original).
pub struct ClientConn {
    name: SyncRwLock<String>,
    connected: AtomicBool,
    session: SyncMutex<HashMap<String, String>>,
    writer: AsyncMutex<Option<BoxedWriter>>,
}

impl ClientConn {
    /// A connection with no write half yet (used by tests and by handlers
    /// that never need to push data back).
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: SyncRwLock::new(name.into()),
            connected: AtomicBool::new(true),
            session: SyncMutex::new(HashMap::new()),
            writer: AsyncMutex::new(None),
        })
    }

    pub fn with_writer(name: impl Into<String>, writer: BoxedWriter) -> Arc<Self> {
        Arc::new(Self {
            name: SyncRwLock::new(name.into()),
            connected: AtomicBool::new(true),
            session: SyncMutex::new(HashMap::new()),
            writer: AsyncMutex::new(Some(writer)),
        })
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_session(&self, key: impl Into<String>, value: impl Into<String>) {
        self.session.lock().insert(key.into(), value.into());
    }

    pub fn get_session(&self, key: &str) -> Option<String> {
        self.session.lock().get(key).cloned()
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Frames `body` under `code` and writes it to the client within a
    /// 1-second deadline, matching `ReqConn.SendWithTimeout`. A disconnected
    /// connection (no writer installed, or one that already failed) fails
    /// fast without touching the socket.
    pub async fn send(&self, code: u16, body: &[u8]) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::Disconnected);
        }
        let frame = step_wire::encode_client_request(code, body).map_err(|e| SendError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())))?;

        let mut writer = self.writer.lock().await;
        let Some(w) = writer.as_mut() else {
            return Err(SendError::Disconnected);
        };

        match tokio::time::timeout(CLIENT_WRITE_TIMEOUT, w.write_all(&frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                drop(writer);
                self.mark_disconnected();
                Err(SendError::Io(e))
            }
            Err(_) => {
                drop(writer);
                self.mark_disconnected();
                Err(SendError::Timeout)
            }
        }
    }
}

#[derive(Default)]
pub struct ReqDispatch {
    handlers: HashMap<u16, ReqHandler>,
    default_handler: Option<ReqHandler>,
    conn_lost_handler: Option<ConnLostHandler>,
}

impl ReqDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, code: u16, handler: ReqHandler) {
        self.handlers.insert(code, handler);
    }

    pub fn set_default_handler(&mut self, handler: ReqHandler) {
        self.default_handler = Some(handler);
    }

    pub fn set_conn_lost_handler(&mut self, handler: ConnLostHandler) {
        self.conn_lost_handler = Some(handler);
    }

    fn handler_for(&self, code: u16) -> Option<ReqHandler> {
        self.handlers.get(&code).cloned().or_else(|| self.default_handler.clone())
    }
}

/// Reads client-request frames until the peer closes, a frame is malformed,
/// or 90 seconds pass without a successful read. Every successful read
/// refreshes the deadline, so the timeout behaves as an idle reaper rather
/// than a hard connection lifetime.
pub async fn client_read_loop(conn: Arc<ClientConn>, mut reader: BoxedReader, dispatch: Arc<ReqDispatch>) {
    loop {
        match tokio::time::timeout(CLIENT_IDLE_TIMEOUT, read_client_frame(&mut reader)).await {
            Ok(Ok(frame)) => match dispatch.handler_for(frame.code) {
                Some(handler) => handler(conn.clone(), frame.code, frame.body).await,
                None => warn!(name = %conn.name(), code = frame.code, "no req handler registered"),
            },
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    info!(name = %conn.name(), "client connection closed by peer");
                } else {
                    warn!(name = %conn.name(), error = %e, "client connection read error");
                }
                break;
            }
            Err(_) => {
                info!(name = %conn.name(), "client connection idle for 90s, closing");
                break;
            }
        }
    }

    conn.mark_disconnected();
    if let Some(handler) = &dispatch.conn_lost_handler {
        handler(conn).await;
    }
}

async fn read_client_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<step_wire::ClientRequestFrame> {
    let mut header = [0u8; 6];
    reader.read_exact(&mut header).await?;
    let total_len = step_wire::client_request_frame_len(&header)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let mut frame = vec![0u8; total_len];
    frame[..6].copy_from_slice(&header);
    reader.read_exact(&mut frame[6..]).await?;
    step_wire::decode_client_request(&frame).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::io::duplex;

    #[tokio::test]
    async fn dispatches_registered_code_and_falls_back_to_default() {
        let mut dispatch = ReqDispatch::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        dispatch.register(
            1,
            Arc::new(move |_conn, _code, _body| {
                let seen = seen_clone.clone();
                Box::pin(async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        let default_seen = Arc::new(AtomicU32::new(0));
        let default_clone = default_seen.clone();
        dispatch.set_default_handler(Arc::new(move |_conn, _code, _body| {
            let default_seen = default_clone.clone();
            Box::pin(async move {
                default_seen.fetch_add(1, Ordering::SeqCst);
            })
        }));

        let (mut client, server) = duplex(4096);
        let frame1 = step_wire::encode_client_request(1, b"hello").unwrap();
        let frame2 = step_wire::encode_client_request(99, b"world").unwrap();
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(&frame1).await.unwrap();
            client.write_all(&frame2).await.unwrap();
        });

        let conn = ClientConn::new("test");
        let dispatch = Arc::new(dispatch);
        let (server_reader, _server_writer) = tokio::io::split(server);
        let reader: BoxedReader = Box::new(server_reader);

        let handle = tokio::spawn(client_read_loop(conn, reader, dispatch));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(default_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn client_conn_session_roundtrip() {
        let conn = ClientConn::new("p1");
        conn.set_session("k", "v");
        assert_eq!(conn.get_session("k"), Some("v".to_string()));
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn send_writes_a_decodable_frame_and_disconnected_fails_fast() {
        let (client, server) = duplex(4096);
        let (_reader, writer) = tokio::io::split(server);
        let conn = ClientConn::with_writer("p1", Box::new(writer) as BoxedWriter);

        conn.send(7, b"hi").await.unwrap();

        let (mut client_reader, _client_writer) = tokio::io::split(client);
        let mut header = [0u8; 6];
        client_reader.read_exact(&mut header).await.unwrap();
        let total_len = step_wire::client_request_frame_len(&header).unwrap();
        let mut frame = vec![0u8; total_len];
        frame[..6].copy_from_slice(&header);
        client_reader.read_exact(&mut frame[6..]).await.unwrap();
        let decoded = step_wire::decode_client_request(&frame).unwrap();
        assert_eq!(decoded.code, 7);
        assert_eq!(decoded.body, b"hi");

        let no_writer = ClientConn::new("p2");
        assert!(matches!(no_writer.send(1, b"x").await, Err(SendError::Disconnected)));
    }
}
