//! Config validation and the topology reconcile loop: declared region list
//! in, live outbound RPC connections and DB sessions kept in sync out. See
//! `app/conf.go` for the original shape this generalizes.

mod collaborators;
mod config_loader;
mod error;
mod manager;
mod ws_dial;

pub use collaborators::{DbPool, DbSession, KvPool, LoggerSink, StatsSink};
pub use config_loader::{ConfigLoader, NODE_TYPE_GAME, NODE_TYPE_ZONE};
pub use error::ConfigError;
pub use manager::TopologyManager;
