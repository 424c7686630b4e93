//! Duplex framed RPC transport. Grounded on `app/rpc_conn.go`: a serialized
//! write path (`socketLocker`), a call-id keyed wait map delivering a
//! single response to its caller, a 2-second call timeout, and a read loop
//! that routes request frames to a Channel and response frames to their
//! waiter. No automatic reconnect happens here; that is the topology
//! manager's job for outbound links.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock as SyncRwLock;
use step_sync::{CallIdAllocator, PendingRegistry};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::channel::RpcEntry;
use crate::error::RpcError;
use crate::registry::ChannelRegistry;

const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Either side of a duplex byte stream, boxed so `RpcConnection` stays
/// generic-free (the concrete transport, TCP or otherwise, is chosen by
/// the acceptor/dialer).
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;
pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

pub struct RpcConnection {
    name: SyncRwLock<String>,
    connected: AtomicBool,
    writer: AsyncMutex<Option<BoxedWriter>>,
    call_ids: CallIdAllocator,
    pending: PendingRegistry<u16, Vec<u8>>,
}

impl RpcConnection {
    pub fn new(name: impl Into<String>, writer: BoxedWriter) -> Arc<Self> {
        Arc::new(Self {
            name: SyncRwLock::new(name.into()),
            connected: AtomicBool::new(true),
            writer: AsyncMutex::new(Some(writer)),
            call_ids: CallIdAllocator::new(),
            pending: PendingRegistry::new(),
        })
    }

    /// A connection that has no live socket yet, matching the topology
    /// manager's `NewRpcConn(nil, false)` placeholder: reused by address
    /// across reconcile cycles until `install_writer` succeeds on a dial.
    pub fn placeholder(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: SyncRwLock::new(name.into()),
            connected: AtomicBool::new(false),
            writer: AsyncMutex::new(None),
            call_ids: CallIdAllocator::new(),
            pending: PendingRegistry::new(),
        })
    }

    /// Installs a freshly dialed socket's write half and marks the
    /// connection connected. Called after a successful outbound dial.
    pub async fn install_writer(&self, name: impl Into<String>, writer: BoxedWriter) {
        *self.name.write() = name.into();
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::Release);
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

    async fn write_message(&self, message: &[u8]) -> Result<(), RpcError> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => w.write_all(message).await.map_err(|_| RpcError::NetworkWrite),
            None => Err(RpcError::Disconnected),
        }
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Blocks the caller up to 2 seconds for a response, matching by call
    /// id. Wraparound collisions (the allocated id is already pending)
    /// surface as `PendingQueueFull`.
    pub async fn call(&self, channel_key: &str, code: u16, body: &[u8]) -> Result<Vec<u8>, RpcError> {
        if !self.is_connected() {
            return Err(RpcError::Disconnected);
        }

        let call_id = self.call_ids.next();
        let rx = self.pending.register(call_id).ok_or(RpcError::PendingQueueFull)?;

        let frame = step_wire::encode_rpc_request(call_id, code, channel_key, body)
            .map_err(|_| RpcError::NetworkWrite)?;

        if self.write_message(&frame).await.is_err() {
            self.mark_disconnected();
            self.pending.remove(&call_id);
            return Err(RpcError::NetworkWrite);
        }

        match tokio::time::timeout(RPC_CALL_TIMEOUT, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(RpcError::NetworkRead), // sender dropped: teardown raced the response
            Err(_) => {
                self.pending.remove(&call_id);
                Err(RpcError::CallTimeout)
            }
        }
    }

    pub async fn cast(&self, channel_key: &str, code: u16, body: &[u8]) -> Result<(), RpcError> {
        if !self.is_connected() {
            return Err(RpcError::Disconnected);
        }
        let frame = step_wire::encode_rpc_request(0, code, channel_key, body)
            .map_err(|_| RpcError::NetworkWrite)?;
        if self.write_message(&frame).await.is_err() {
            self.mark_disconnected();
            return Err(RpcError::NetworkWrite);
        }
        Ok(())
    }

    pub async fn resp(&self, call_id: u16, status: u8, body: &[u8]) -> Result<(), RpcError> {
        if !self.is_connected() {
            return Err(RpcError::Disconnected);
        }
        let frame = step_wire::encode_rpc_response(call_id, status, body).map_err(|_| RpcError::NetworkWrite)?;
        if self.write_message(&frame).await.is_err() {
            self.mark_disconnected();
            return Err(RpcError::NetworkWrite);
        }
        Ok(())
    }

    /// Signals every outstanding waiter with a closed channel so callers
    /// observe an error instead of hanging, matching the "waiters receive
    /// nil on teardown" invariant.
    pub fn close(&self) {
        self.mark_disconnected();
        self.pending.drain();
    }
}

async fn read_rpc_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<step_wire::RpcFrame> {
    let mut type_byte = [0u8; 1];
    reader.read_exact(&mut type_byte).await?;
    match type_byte[0] {
        step_wire::RPC_FRAME_TYPE_REQUEST => {
            let mut rest = [0u8; 9];
            reader.read_exact(&mut rest).await?;
            let mut header = [0u8; 10];
            header[0] = type_byte[0];
            header[1..].copy_from_slice(&rest);
            let (key_len, body_len) = step_wire::rpc_request_header_lens(&header);
            let mut tail = vec![0u8; key_len + body_len];
            reader.read_exact(&mut tail).await?;
            let mut full = Vec::with_capacity(header.len() + tail.len());
            full.extend_from_slice(&header);
            full.extend_from_slice(&tail);
            step_wire::decode_rpc_frame(&full)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        }
        step_wire::RPC_FRAME_TYPE_RESPONSE => {
            let mut rest = [0u8; 7];
            reader.read_exact(&mut rest).await?;
            let mut header = [0u8; 8];
            header[0] = type_byte[0];
            header[1..].copy_from_slice(&rest);
            let body_len = step_wire::rpc_response_header_body_len(&header);
            let mut tail = vec![0u8; body_len];
            reader.read_exact(&mut tail).await?;
            let mut full = Vec::with_capacity(header.len() + tail.len());
            full.extend_from_slice(&header);
            full.extend_from_slice(&tail);
            step_wire::decode_rpc_frame(&full)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        }
        other => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown rpc frame type {other}"),
        )),
    }
}

/// Drives the read half of a connection until the peer closes or a
/// malformed frame is seen. Request frames are routed to the Channel named
/// by their channel key (dropped non-blockingly if that channel is full);
/// response frames are delivered to their waiter. On any error the
/// connection is marked disconnected and the loop returns; reconnection, if
/// any, is the caller's (topology manager's) job.
pub async fn read_loop(
    conn: Arc<RpcConnection>,
    mut reader: BoxedReader,
    channels: Arc<ChannelRegistry>,
) {
    loop {
        match read_rpc_frame(&mut reader).await {
            Ok(step_wire::RpcFrame::Request(req)) => {
                let channel = channels.get_or_create(&req.channel_key);
                let entry = RpcEntry {
                    call_id: req.call_id,
                    code: req.code,
                    channel_key: req.channel_key.clone(),
                    body: req.body,
                    conn: Some(conn.clone()),
                };
                if let Err(e) = channel.enqueue_rpc(entry) {
                    warn!(channel_key = %req.channel_key, error = %e, "dropped rpc request, channel full");
                }
            }
            Ok(step_wire::RpcFrame::Response(resp)) => {
                if !conn.pending.fulfill(&resp.call_id, resp.body) {
                    // Already timed out and removed; discard silently.
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    info!(name = %conn.name(), "connection closed by peer");
                } else {
                    error!(name = %conn.name(), error = %e, "connection read error");
                }
                conn.close();
                return;
            }
        }
    }
}
