//! Classifies inbound WebSocket upgrades the way `app/web_server.go`'s
//! `Acceptor.ServeHTTP` does: a request carrying two `X-Rpc-Service-Name`
//! header values (zone name, then service name — the original's
//! `X-My-Rpc-Service-Name`) is a sibling peer RPC connection; anything else
//! reaching the upgrade route is a client connection. Admin HTTP traffic
//! never reaches here — it falls through the merged router's other routes
//! before this one ever sees it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::RwLock;
use step_runtime::{read_loop, ChannelRegistry, RpcConnection};
use tracing::info;

use crate::req::{client_read_loop, ClientConn, ReqDispatch};
use crate::ws_stream::split_ws;

pub const PEER_SERVICE_NAME_HEADER: &str = "x-rpc-service-name";

/// Accepts both peer RPC connections and client connections on one `/ws`
/// upgrade route, classifying each by its handshake headers. Peer
/// connections are kept in a service-name-keyed map (the original's
/// `serviceRpcConnMap`); a later connection for the same service name
/// supersedes the former one.
pub struct Acceptor {
    channels: Arc<ChannelRegistry>,
    req_dispatch: Arc<ReqDispatch>,
    service_conns: RwLock<HashMap<String, Arc<RpcConnection>>>,
}

impl Acceptor {
    pub fn new(channels: Arc<ChannelRegistry>, req_dispatch: Arc<ReqDispatch>) -> Arc<Self> {
        Arc::new(Self { channels, req_dispatch, service_conns: RwLock::new(HashMap::new()) })
    }

    pub fn service_conn(&self, service_name: &str) -> Option<Arc<RpcConnection>> {
        self.service_conns.read().get(service_name).cloned()
    }

    /// The `/ws` upgrade route, to be merged into the process's single HTTP
    /// router alongside the admin routes.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/ws", get(ws_upgrade)).with_state(self)
    }

    async fn handle_peer(
        self: Arc<Self>,
        socket: axum::extract::ws::WebSocket,
        zone_name: String,
        service_name: String,
        addr: String,
    ) {
        let name = format!("{addr} {zone_name}");
        info!(%addr, zone = %zone_name, service = %service_name, "peer rpc connection accepted");

        let (reader, writer) = split_ws(socket);
        let conn = RpcConnection::new(name, writer);
        self.service_conns.write().insert(service_name, conn.clone());

        read_loop(conn, reader, self.channels.clone()).await;
    }

    async fn handle_client(self: Arc<Self>, socket: axum::extract::ws::WebSocket, addr: String) {
        let (reader, writer) = split_ws(socket);
        let conn = ClientConn::with_writer(addr, writer);
        client_read_loop(conn, reader, self.req_dispatch.clone()).await;
    }
}

async fn ws_upgrade(
    State(acceptor): State<Arc<Acceptor>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let names: Vec<String> =
        headers.get_all(PEER_SERVICE_NAME_HEADER).iter().filter_map(|v| v.to_str().ok().map(str::to_string)).collect();
    let addr = addr.to_string();

    if names.len() >= 2 {
        let zone_name = names[0].clone();
        let service_name = names[1].clone();
        ws.on_upgrade(move |socket| acceptor.handle_peer(socket, zone_name, service_name, addr))
    } else {
        ws.on_upgrade(move |socket| acceptor.handle_client(socket, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use step_runtime::Dispatch;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    async fn spawn_router(acceptor: Arc<Acceptor>) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = acceptor.router().into_make_service_with_connect_info::<std::net::SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        addr
    }

    #[tokio::test]
    async fn peer_handshake_registers_connection_under_service_name() {
        let channels = ChannelRegistry::new(Arc::new(Dispatch::new()));
        let acceptor = Acceptor::new(channels, Arc::new(ReqDispatch::new()));
        let addr = spawn_router(acceptor.clone()).await;

        let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
        request.headers_mut().append(
            PEER_SERVICE_NAME_HEADER,
            "game1".parse().unwrap(),
        );
        request.headers_mut().append(
            PEER_SERVICE_NAME_HEADER,
            "svc-a".parse().unwrap(),
        );
        let (_socket, _resp) = tokio_tungstenite::connect_async(request).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(acceptor.service_conn("svc-a").is_some());
    }

    #[tokio::test]
    async fn connection_without_handshake_headers_is_treated_as_client() {
        let channels = ChannelRegistry::new(Arc::new(Dispatch::new()));
        let acceptor = Acceptor::new(channels, Arc::new(ReqDispatch::new()));
        let addr = spawn_router(acceptor.clone()).await;

        let url = format!("ws://{addr}/ws");
        let (_socket, _resp) = tokio_tungstenite::connect_async(url).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(acceptor.service_conn("anything").is_none());
    }
}
