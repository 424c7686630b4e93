//! Channel and RPC fabric: per-key serial executors, a code-dispatch table,
//! a process-wide channel registry, and the duplex framed transport that
//! feeds them. See `step-wire` for the frame codec this crate reads and
//! writes.

mod channel;
mod dispatch;
mod error;
mod registry;
mod rpc_agent;
mod rpc_conn;

pub use channel::{ChannelHandle, LapEntry, RpcEntry, EMPTY_KEY_QUEUE_CAPACITY, IDLE_RECYCLE_MINUTES, KEYED_QUEUE_CAPACITY};
pub use dispatch::{BoxFuture, Dispatch, LapHandler, RpcHandler};
pub use error::{ChannelError, RpcError};
pub use registry::ChannelRegistry;
pub use rpc_agent::RpcAgent;
pub use rpc_conn::{read_loop, BoxedReader, BoxedWriter, RpcConnection};
