//! Admin HTTP surface: a public handler table (no auth) and a private one
//! (shared-secret header required), both returning the uniform
//! `{status, msg, data}` envelope. A request may carry a channel-key header
//! asking that its handler run inside the Channel fabric instead of inline.
//! Grounded on `app/qry_handle.go`'s `handleQuery` (public-then-private
//! dispatch, `X-My-Qry-Admin-Token` secret check) and `app/qry.go`'s
//! `RspSuccess`/`RspFail` envelope.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Json};
use axum::Router;
use step_runtime::{ChannelRegistry, LapEntry, LapHandler};
use tokio::sync::oneshot;
use tracing::error;

pub const ADMIN_TOKEN_HEADER: &str = "x-my-qry-admin-token";
pub const CHANNEL_KEY_HEADER: &str = "x-my-qry-channel-uid";
const CHANNEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AdminRequest {
    pub path: String,
    pub query: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AdminResponse {
    pub status: u8,
    pub msg: String,
    pub data: serde_json::Value,
}

impl AdminResponse {
    pub fn success(data: serde_json::Value) -> Self {
        Self { status: 1, msg: "success".into(), data }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self { status: 0, msg: msg.into(), data: serde_json::Value::Null }
    }
}

pub type AdminFuture = Pin<Box<dyn Future<Output = AdminResponse> + Send>>;
pub type AdminHandler = Arc<dyn Fn(AdminRequest) -> AdminFuture + Send + Sync>;

/// The payload shape enqueued onto a Channel when a request carries a
/// channel-key header: the resolved handler, its request, and the sender
/// half of a oneshot the HTTP task is awaiting on.
type ChannelRoutedRequest = (AdminHandler, AdminRequest, oneshot::Sender<AdminResponse>);

pub struct AdminState {
    admin_token: String,
    public_handlers: HashMap<String, AdminHandler>,
    private_handlers: HashMap<String, AdminHandler>,
    channels: Arc<ChannelRegistry>,
}

impl AdminState {
    pub fn new(admin_token: impl Into<String>, channels: Arc<ChannelRegistry>) -> Self {
        Self { admin_token: admin_token.into(), public_handlers: HashMap::new(), private_handlers: HashMap::new(), channels }
    }

    pub fn register_public(&mut self, path: impl Into<String>, handler: AdminHandler) {
        self.public_handlers.insert(path.into(), handler);
    }

    pub fn register_private(&mut self, path: impl Into<String>, handler: AdminHandler) {
        self.private_handlers.insert(path.into(), handler);
    }
}

/// The process-wide lap handler installed on `Dispatch`: downcasts the
/// Channel-delivered payload back to a `ChannelRoutedRequest`, runs the
/// resolved admin handler, and answers the waiting oneshot.
pub fn channel_routed_lap_handler() -> LapHandler {
    Arc::new(|lap: LapEntry| {
        Box::pin(async move {
            match lap.payload.downcast::<ChannelRoutedRequest>() {
                Ok(boxed) => {
                    let (handler, req, tx) = *boxed;
                    let resp = handler(req).await;
                    let _ = tx.send(resp);
                }
                Err(_) => {
                    error!(channel_key = %lap.channel_key, "lap payload was not a channel-routed admin request");
                }
            }
        })
    })
}

pub fn router(state: Arc<AdminState>) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(
    State(state): State<Arc<AdminState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if method != Method::GET && method != Method::POST {
        return envelope(AdminResponse::fail("not supported method"));
    }

    let path = uri.path().to_string();
    let query = uri.query().unwrap_or("").to_string();
    let channel_key = headers.get(CHANNEL_KEY_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);

    if let Some(handler) = state.public_handlers.get(&path).cloned() {
        return envelope(dispatch(&state, handler, path, query, body.to_vec(), channel_key).await);
    }

    let token_ok = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == state.admin_token)
        .unwrap_or(false);
    if !token_ok {
        return envelope(AdminResponse::fail("not found"));
    }

    if let Some(handler) = state.private_handlers.get(&path).cloned() {
        return envelope(dispatch(&state, handler, path, query, body.to_vec(), channel_key).await);
    }

    envelope(AdminResponse::fail("no handler"))
}

async fn dispatch(
    state: &AdminState,
    handler: AdminHandler,
    path: String,
    query: String,
    body: Vec<u8>,
    channel_key: Option<String>,
) -> AdminResponse {
    let req = AdminRequest { path, query, body };
    let Some(key) = channel_key else {
        return handler(req).await;
    };

    let (tx, rx) = oneshot::channel();
    let channel = state.channels.get_or_create(&key);
    let payload: ChannelRoutedRequest = (handler, req, tx);
    let entry = LapEntry { channel_key: key, payload: Box::new(payload) as Box<dyn Any + Send> };
    if let Err(e) = channel.enqueue_lap(entry) {
        return AdminResponse::fail(format!("channel overloaded: {e}"));
    }

    match tokio::time::timeout(CHANNEL_REQUEST_TIMEOUT, rx).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(_)) => AdminResponse::fail("channel dropped the request"),
        Err(_) => AdminResponse::fail("channel request timed out"),
    }
}

fn envelope(resp: AdminResponse) -> impl IntoResponse {
    Json(serde_json::json!({ "status": resp.status, "msg": resp.msg, "data": resp.data }))
}
