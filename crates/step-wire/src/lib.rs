//! Pack/unpack of the three wire frame kinds: client-request, rpc-request,
//! rpc-response. All integers are little-endian. This crate only ever sees
//! complete in-memory buffers; incremental reads off a socket live in
//! `step-runtime`, which knows how many bytes to pull before handing a
//! buffer here.

use std::fmt;

pub const CLIENT_SENTINEL: u8 = 218;
pub const CLIENT_MODE: u8 = 80;
pub const MAX_RPC_BODY_BYTES: usize = 4 * 1024 * 1024;
pub const MAX_CHANNEL_KEY_LEN: usize = 255;

pub const RPC_FRAME_TYPE_REQUEST: u8 = 1;
pub const RPC_FRAME_TYPE_RESPONSE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    SentinelMismatch { got: u8 },
    ModeMismatch { got: u8 },
    SizeMismatch { expected: usize, actual: usize },
    FrameTooShort { len: usize, want: usize },
    ChannelKeyTooLong { len: usize },
    BodyTooLarge { len: usize, max: usize },
    UnknownFrameType { got: u8 },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SentinelMismatch { got } => write!(f, "sentinel mismatch: got {got}"),
            Self::ModeMismatch { got } => write!(f, "mode mismatch: got {got}"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "declared size mismatch: expected {expected}, got {actual}")
            }
            Self::FrameTooShort { len, want } => {
                write!(f, "frame too short: have {len} bytes, need at least {want}")
            }
            Self::ChannelKeyTooLong { len } => {
                write!(f, "channel key too long: {len} > {MAX_CHANNEL_KEY_LEN}")
            }
            Self::BodyTooLarge { len, max } => write!(f, "body too large: {len} > {max}"),
            Self::UnknownFrameType { got } => write!(f, "unknown rpc frame type: {got}"),
        }
    }
}

impl std::error::Error for WireError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequestFrame {
    pub code: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequestFrame {
    pub call_id: u16,
    pub code: u16,
    pub channel_key: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponseFrame {
    pub call_id: u16,
    pub status: u8,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcFrame {
    Request(RpcRequestFrame),
    Response(RpcResponseFrame),
}

pub fn encode_client_request(code: u16, body: &[u8]) -> Result<Vec<u8>, WireError> {
    let declared_size = 2 + body.len();
    let mut out = Vec::with_capacity(6 + declared_size);
    out.push(CLIENT_SENTINEL);
    out.push(CLIENT_MODE);
    out.extend_from_slice(&(declared_size as u32).to_le_bytes());
    out.extend_from_slice(&code.to_le_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Given the first 6 header bytes of a client-request frame, returns the
/// total frame length (header + body) the caller must read before calling
/// [`decode_client_request`].
pub fn client_request_frame_len(header: &[u8; 6]) -> Result<usize, WireError> {
    if header[0] != CLIENT_SENTINEL {
        return Err(WireError::SentinelMismatch { got: header[0] });
    }
    if header[1] != CLIENT_MODE {
        return Err(WireError::ModeMismatch { got: header[1] });
    }
    let declared_size = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
    Ok(6 + declared_size)
}

pub fn decode_client_request(frame: &[u8]) -> Result<ClientRequestFrame, WireError> {
    if frame.len() < 6 {
        return Err(WireError::FrameTooShort { len: frame.len(), want: 6 });
    }
    if frame[0] != CLIENT_SENTINEL {
        return Err(WireError::SentinelMismatch { got: frame[0] });
    }
    if frame[1] != CLIENT_MODE {
        return Err(WireError::ModeMismatch { got: frame[1] });
    }
    let declared_size = u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]) as usize;
    let actual_size = frame.len() - 6;
    if declared_size != actual_size {
        return Err(WireError::SizeMismatch { expected: declared_size, actual: actual_size });
    }
    if declared_size < 2 {
        return Err(WireError::FrameTooShort { len: declared_size, want: 2 });
    }
    let code = u16::from_le_bytes([frame[6], frame[7]]);
    let body = frame[8..].to_vec();
    Ok(ClientRequestFrame { code, body })
}

pub fn encode_rpc_request(
    call_id: u16,
    code: u16,
    channel_key: &str,
    body: &[u8],
) -> Result<Vec<u8>, WireError> {
    if channel_key.len() > MAX_CHANNEL_KEY_LEN {
        return Err(WireError::ChannelKeyTooLong { len: channel_key.len() });
    }
    if body.len() > MAX_RPC_BODY_BYTES {
        return Err(WireError::BodyTooLarge { len: body.len(), max: MAX_RPC_BODY_BYTES });
    }
    let mut out = Vec::with_capacity(10 + channel_key.len() + body.len());
    out.push(RPC_FRAME_TYPE_REQUEST);
    out.extend_from_slice(&call_id.to_le_bytes());
    out.extend_from_slice(&code.to_le_bytes());
    out.push(channel_key.len() as u8);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(channel_key.as_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

pub fn encode_rpc_response(call_id: u16, status: u8, body: &[u8]) -> Result<Vec<u8>, WireError> {
    if body.len() > MAX_RPC_BODY_BYTES {
        return Err(WireError::BodyTooLarge { len: body.len(), max: MAX_RPC_BODY_BYTES });
    }
    let mut out = Vec::with_capacity(8 + body.len());
    out.push(RPC_FRAME_TYPE_RESPONSE);
    out.extend_from_slice(&call_id.to_le_bytes());
    out.push(status);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Decodes a whole RPC-direction frame (request or response), selecting on
/// the leading type byte.
pub fn decode_rpc_frame(frame: &[u8]) -> Result<RpcFrame, WireError> {
    if frame.is_empty() {
        return Err(WireError::FrameTooShort { len: 0, want: 1 });
    }
    match frame[0] {
        RPC_FRAME_TYPE_REQUEST => decode_rpc_request(frame).map(RpcFrame::Request),
        RPC_FRAME_TYPE_RESPONSE => decode_rpc_response(frame).map(RpcFrame::Response),
        other => Err(WireError::UnknownFrameType { got: other }),
    }
}

fn decode_rpc_request(frame: &[u8]) -> Result<RpcRequestFrame, WireError> {
    if frame.len() < 10 {
        return Err(WireError::FrameTooShort { len: frame.len(), want: 10 });
    }
    let call_id = u16::from_le_bytes([frame[1], frame[2]]);
    let code = u16::from_le_bytes([frame[3], frame[4]]);
    let key_len = frame[5] as usize;
    let body_len = u32::from_le_bytes([frame[6], frame[7], frame[8], frame[9]]) as usize;
    if body_len > MAX_RPC_BODY_BYTES {
        return Err(WireError::BodyTooLarge { len: body_len, max: MAX_RPC_BODY_BYTES });
    }
    let want = 10 + key_len + body_len;
    if frame.len() != want {
        return Err(WireError::SizeMismatch { expected: want, actual: frame.len() });
    }
    let channel_key = String::from_utf8_lossy(&frame[10..10 + key_len]).into_owned();
    let body = frame[10 + key_len..].to_vec();
    Ok(RpcRequestFrame { call_id, code, channel_key, body })
}

fn decode_rpc_response(frame: &[u8]) -> Result<RpcResponseFrame, WireError> {
    if frame.len() < 8 {
        return Err(WireError::FrameTooShort { len: frame.len(), want: 8 });
    }
    let call_id = u16::from_le_bytes([frame[1], frame[2]]);
    let status = frame[3];
    let body_len = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
    if body_len > MAX_RPC_BODY_BYTES {
        return Err(WireError::BodyTooLarge { len: body_len, max: MAX_RPC_BODY_BYTES });
    }
    let want = 8 + body_len;
    if frame.len() != want {
        return Err(WireError::SizeMismatch { expected: want, actual: frame.len() });
    }
    let body = frame[8..].to_vec();
    Ok(RpcResponseFrame { call_id, status, body })
}

/// Reads the body-length field out of a partially-read rpc-request header,
/// given the first 10 bytes and the channel-key bytes that follow them.
/// Used by an incremental socket reader that must know how many more bytes
/// to pull before the frame is complete.
pub fn rpc_request_header_lens(header: &[u8; 10]) -> (usize, usize) {
    let key_len = header[5] as usize;
    let body_len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
    (key_len, body_len)
}

pub fn rpc_response_header_body_len(header: &[u8; 8]) -> usize {
    u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize
}
