//! Client- and peer-facing network surface: a WebSocket upgrade route
//! classifying both peer RPC handshakes and client connections by header,
//! merged into the same router as the admin HTTP surface and served on one
//! listener. Grounded on `app/web_server.go`'s single `http.Server` dispatch.

mod acceptor;
mod admin;
mod req;
mod ws_stream;

pub use acceptor::{Acceptor, PEER_SERVICE_NAME_HEADER};
pub use admin::{
    channel_routed_lap_handler, router, AdminFuture, AdminHandler, AdminRequest, AdminResponse, AdminState,
    ADMIN_TOKEN_HEADER, CHANNEL_KEY_HEADER,
};
pub use req::{
    client_read_loop, ClientConn, ConnLostHandler, ReqDispatch, ReqFuture, ReqHandler, SendError,
    CLIENT_IDLE_TIMEOUT,
};
