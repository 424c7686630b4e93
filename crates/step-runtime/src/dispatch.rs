//! Code-keyed handler tables with a fallback default slot, one per message
//! kind. Grounded on `app/channel.go`'s `rpcHandlers`/`defaultRpcHandler`/
//! `lapHandler` package globals: here they are plain data held by whoever
//! builds the `Dispatch`, not globals, per the "process-wide state does not
//! require globals" design note.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::channel::{LapEntry, RpcEntry};

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type RpcHandler = Arc<dyn Fn(RpcEntry) -> BoxFuture + Send + Sync>;
pub type LapHandler = Arc<dyn Fn(LapEntry) -> BoxFuture + Send + Sync>;

#[derive(Default)]
pub struct Dispatch {
    rpc_handlers: HashMap<u16, RpcHandler>,
    default_rpc_handler: Option<RpcHandler>,
    lap_handler: Option<LapHandler>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_rpc(&mut self, code: u16, handler: RpcHandler) {
        self.rpc_handlers.insert(code, handler);
    }

    pub fn set_default_rpc_handler(&mut self, handler: RpcHandler) {
        self.default_rpc_handler = Some(handler);
    }

    pub fn set_lap_handler(&mut self, handler: LapHandler) {
        self.lap_handler = Some(handler);
    }

    pub fn rpc_handler_for(&self, code: u16) -> Option<RpcHandler> {
        self.rpc_handlers.get(&code).cloned().or_else(|| self.default_rpc_handler.clone())
    }

    pub fn lap_handler(&self) -> Option<LapHandler> {
        self.lap_handler.clone()
    }
}
