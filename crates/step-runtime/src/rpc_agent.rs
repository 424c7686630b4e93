//! Sticky-error wrapper around an `RpcConnection`. Grounded on
//! `app/rpc_agent.go`'s `RpcAgent.Call`/`Cast`: an agent either holds a
//! usable connection plus the channel key it calls against, or was built
//! already in error (the topology it was resolved from had no live link)
//! and every subsequent call short-circuits with that error rather than
//! touching a socket.

use std::sync::Arc;

use step_wire::MAX_RPC_BODY_BYTES;

use crate::error::RpcError;
use crate::rpc_conn::RpcConnection;

enum AgentState {
    Bound { conn: Arc<RpcConnection>, channel_key: String },
    Error(RpcError),
}

pub struct RpcAgent {
    state: AgentState,
}

impl RpcAgent {
    pub fn bound(conn: Arc<RpcConnection>, channel_key: impl Into<String>) -> Self {
        Self { state: AgentState::Bound { conn, channel_key: channel_key.into() } }
    }

    pub fn errored(err: RpcError) -> Self {
        Self { state: AgentState::Error(err) }
    }

    pub async fn call(&self, code: u16, body: &[u8]) -> Result<Vec<u8>, RpcError> {
        let (conn, channel_key) = match &self.state {
            AgentState::Bound { conn, channel_key } => (conn, channel_key),
            AgentState::Error(err) => return Err(err.clone()),
        };
        if body.len() > MAX_RPC_BODY_BYTES {
            return Err(RpcError::ApplicationFail(format!(
                "body of {} bytes exceeds the {} byte limit",
                body.len(),
                MAX_RPC_BODY_BYTES
            )));
        }
        let response = conn.call(channel_key, code, body).await?;
        interpret_response(response)
    }

    pub async fn cast(&self, code: u16, body: &[u8]) -> Result<(), RpcError> {
        let (conn, channel_key) = match &self.state {
            AgentState::Bound { conn, channel_key } => (conn, channel_key),
            AgentState::Error(err) => return Err(err.clone()),
        };
        if body.len() > MAX_RPC_BODY_BYTES {
            return Err(RpcError::ApplicationFail(format!(
                "body of {} bytes exceeds the {} byte limit",
                body.len(),
                MAX_RPC_BODY_BYTES
            )));
        }
        conn.cast(channel_key, code, body).await
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.state, AgentState::Error(_))
    }
}

/// The response payload from `RpcConnection::call` carries a leading status
/// byte (0 = ok, 1 = application-level failure, anything else = server
/// fault) ahead of the real body, matching the three-way switch in the
/// original `Call` method.
fn interpret_response(mut response: Vec<u8>) -> Result<Vec<u8>, RpcError> {
    if response.is_empty() {
        return Err(RpcError::ServerFault);
    }
    let status = response.remove(0);
    match status {
        0 => Ok(response),
        1 => Err(RpcError::ApplicationFail(String::from_utf8_lossy(&response).into_owned())),
        _ => Err(RpcError::ServerFault),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errored_agent_short_circuits() {
        let agent = RpcAgent::errored(RpcError::Disconnected);
        assert!(agent.is_errored());
    }

    #[test]
    fn interpret_ok_status_strips_leading_byte() {
        assert_eq!(interpret_response(vec![0, 1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn interpret_application_fail_status() {
        let err = interpret_response(vec![1, b'n', b'o']).unwrap_err();
        assert!(matches!(err, RpcError::ApplicationFail(msg) if msg == "no"));
    }

    #[test]
    fn interpret_unknown_status_is_server_fault() {
        assert!(matches!(interpret_response(vec![9]).unwrap_err(), RpcError::ServerFault));
    }
}
