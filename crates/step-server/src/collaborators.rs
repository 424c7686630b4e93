//! Minimal stand-ins for the external collaborators `step-topology` and
//! `step-board` only define trait objects for: a document store, a document
//! database pool, and a KV pool. Wiring a real driver in is out of scope
//! (same non-goal as the crates that declare these traits); these
//! implementations exist so the binary has something concrete to hand the
//! Init-time constructors, and log instead of touching a network.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use step_board::{DocumentStore, StoreError};
use step_topology::{ConfigError, DbPool, DbSession, KvPool, LoggerSink, StatsSink};
use tracing::info;

pub struct TracingLoggerSink;

impl LoggerSink for TracingLoggerSink {
    fn reconfigure(&self, app_name: &str, region_id: i32, level: &str, console: bool, log_dir: &str) {
        info!(app_name, region_id, level, console, log_dir, "logger reconfigured");
    }
}

pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn reconfigure(&self, path: &str) {
        info!(path, "stats sink reconfigured");
    }
}

struct NullDbSession {
    addr: String,
}

impl DbSession for NullDbSession {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn close(&self) {
        info!(addr = %self.addr, "db session closed");
    }
}

pub struct NullDbPool;

impl DbPool for NullDbPool {
    fn dial(&self, addr: &str) -> Result<Arc<dyn DbSession>, ConfigError> {
        info!(addr, "dialing db session (stub)");
        Ok(Arc::new(NullDbSession { addr: addr.to_string() }))
    }
}

pub struct NullKvPool;

impl KvPool for NullKvPool {
    fn connect(&self, addr: &str, password: Option<&str>) -> Result<(), ConfigError> {
        info!(addr, has_password = password.is_some(), "connecting kv pool (stub)");
        Ok(())
    }

    fn close(&self) {
        info!("kv pool closed");
    }
}

/// An in-process document store that never persists anything; leaderboard
/// writes succeed and reads return empty. Sufficient for a process that has
/// no external database configured yet.
pub struct NullDocumentStore;

impl<T: Clone + Send + Sync> DocumentStore<T> for NullDocumentStore {
    fn find_all(&self) -> Result<Vec<T>, StoreError> {
        Ok(Vec::new())
    }

    fn find_sorted_all(&self) -> Result<Vec<T>, StoreError> {
        Ok(Vec::new())
    }

    fn insert(&self, _item: &T) -> Result<(), StoreError> {
        Ok(())
    }

    fn update_fields(&self, _key: &str, _fields: &HashMap<String, Value>) -> Result<(), StoreError> {
        Ok(())
    }

    fn upsert(&self, _item: &T) -> Result<(), StoreError> {
        Ok(())
    }

    fn remove_id(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn remove_all(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
