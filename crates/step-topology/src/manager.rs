//! Once-a-second reconciliation of the declared topology against live
//! outbound RPC connections and live DB sessions. Grounded on
//! `app/conf.go`'s `startRefreshRegionRpcConnMap`/`refreshRegionRpcConnMap`
//! (RPC side) and `refreshRegionDbConnMap` (DB side): both build a fresh map
//! by reusing existing entries where the address survives, dialing only the
//! gaps, swapping the map under its lock, then closing whatever fell out of
//! the new address set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use step_runtime::{read_loop, ChannelRegistry, RpcConnection};
use step_types::TopologyDescriptor;
use tracing::{error, info, warn};

use crate::collaborators::{DbPool, DbSession};
use crate::ws_dial::dial_peer;

pub struct TopologyManager {
    descriptor: RwLock<Arc<TopologyDescriptor>>,
    rpc_conns: RwLock<HashMap<String, Arc<RpcConnection>>>,
    db_sessions: RwLock<HashMap<String, Arc<dyn DbSession>>>,
    db_pool: Arc<dyn DbPool>,
    channels: Arc<ChannelRegistry>,
    zone_name: String,
    service_name: String,
}

impl TopologyManager {
    pub fn new(
        descriptor: TopologyDescriptor,
        db_pool: Arc<dyn DbPool>,
        channels: Arc<ChannelRegistry>,
        zone_name: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            descriptor: RwLock::new(Arc::new(descriptor)),
            rpc_conns: RwLock::new(HashMap::new()),
            db_sessions: RwLock::new(HashMap::new()),
            db_pool,
            channels,
            zone_name: zone_name.into(),
            service_name: service_name.into(),
        })
    }

    /// Installs a freshly validated descriptor as the active one. Picked up
    /// by the next reconcile tick, not mid-tick.
    pub fn set_descriptor(&self, descriptor: TopologyDescriptor) {
        *self.descriptor.write() = Arc::new(descriptor);
    }

    pub fn descriptor(&self) -> Arc<TopologyDescriptor> {
        self.descriptor.read().clone()
    }

    pub fn rpc_conn(&self, addr: &str) -> Option<Arc<RpcConnection>> {
        self.rpc_conns.read().get(addr).cloned()
    }

    pub fn db_session(&self, addr: &str) -> Option<Arc<dyn DbSession>> {
        self.db_sessions.read().get(addr).cloned()
    }

    /// Spawns the 1 Hz reconcile loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.reconcile_once().await;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
    }

    /// Runs one reconcile pass. Exposed directly so tests can drive it
    /// without waiting on the real 1-second cadence.
    pub async fn reconcile_once(&self) {
        let desc = self.descriptor();
        self.reconcile_rpc(&desc).await;
        self.reconcile_db(&desc).await;
    }

    async fn reconcile_rpc(&self, desc: &TopologyDescriptor) {
        let required: HashSet<String> =
            desc.region_map.values().filter(|r| !r.rpc_addr.is_empty()).map(|r| r.rpc_addr.clone()).collect();

        let mut to_dial = Vec::new();
        let to_close: Vec<Arc<RpcConnection>>;
        {
            let mut guard = self.rpc_conns.write();
            let mut new_map = HashMap::with_capacity(required.len());
            for addr in &required {
                let conn = guard.remove(addr).unwrap_or_else(|| RpcConnection::placeholder(format!("waiting:{addr}")));
                if !conn.is_connected() {
                    to_dial.push((addr.clone(), conn.clone()));
                }
                new_map.insert(addr.clone(), conn);
            }
            to_close = guard.drain().map(|(_, conn)| conn).collect();
            *guard = new_map;
        }

        for conn in &to_close {
            conn.close();
        }
        for (addr, conn) in to_dial {
            self.dial(&addr, conn).await;
        }
    }

    async fn reconcile_db(&self, desc: &TopologyDescriptor) {
        let required: HashSet<String> =
            desc.region_map.values().filter_map(|r| r.db.as_ref()).map(|db| db.addr.clone()).collect();

        let to_close: Vec<Arc<dyn DbSession>>;
        {
            let mut guard = self.db_sessions.write();
            let mut new_map = HashMap::with_capacity(required.len());
            for addr in &required {
                let session = match guard.remove(addr) {
                    Some(s) => s,
                    None => match self.db_pool.dial(addr) {
                        Ok(s) => s,
                        Err(e) => {
                            error!(%addr, error = %e, "failed to dial region db");
                            continue;
                        }
                    },
                };
                new_map.insert(addr.clone(), session);
            }
            to_close = guard.drain().map(|(_, session)| session).collect();
            *guard = new_map;
        }

        for session in &to_close {
            session.close();
        }
    }

    /// No-op on an already-connected connection. On a disconnected one,
    /// dials a WebSocket carrying the zone/service name handshake header,
    /// installs the writer, and spawns the read loop. A dial failure leaves
    /// the connection disconnected for the next reconcile to retry.
    async fn dial(&self, addr: &str, conn: Arc<RpcConnection>) {
        if conn.is_connected() {
            return;
        }

        let (reader, writer) = match dial_peer(addr, &self.zone_name, &self.service_name).await {
            Ok(halves) => halves,
            Err(e) => {
                warn!(%addr, error = %e, "dial failed, will retry next reconcile");
                return;
            }
        };

        conn.install_writer(addr.to_string(), writer).await;
        info!(%addr, "dialed peer rpc connection");

        let channels = self.channels.clone();
        let conn_for_loop = conn.clone();
        tokio::spawn(async move {
            read_loop(conn_for_loop, reader, channels).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use step_runtime::Dispatch;
    use step_types::{RegionDb, RegionDescriptor};
    use tokio::net::TcpListener;

    /// Accepts one WebSocket upgrade on `/ws` and then just holds the
    /// connection open, enough for `dial_peer` to complete its handshake.
    async fn spawn_ws_accept_loop(listener: TcpListener) {
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                        let (_sink, mut source) = futures_util::StreamExt::split(ws);
                        while futures_util::StreamExt::next(&mut source).await.is_some() {}
                    }
                });
            }
        });
    }

    struct NullDbPool;
    impl DbPool for NullDbPool {
        fn dial(&self, addr: &str) -> Result<Arc<dyn DbSession>, crate::error::ConfigError> {
            Ok(Arc::new(FakeSession(addr.to_string())))
        }
    }

    struct FakeSession(String);
    impl DbSession for FakeSession {
        fn addr(&self) -> &str {
            &self.0
        }
        fn close(&self) {}
    }

    fn manager_with(desc: TopologyDescriptor) -> Arc<TopologyManager> {
        let channels = ChannelRegistry::new(Arc::new(Dispatch::new()));
        TopologyManager::new(desc, Arc::new(NullDbPool), channels, "game1", "svc")
    }

    #[tokio::test]
    async fn reconcile_dials_new_address_and_closes_dropped_one() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        spawn_ws_accept_loop(listener).await;

        let mut desc = TopologyDescriptor::default();
        desc.region_map.insert(
            1,
            RegionDescriptor { id: 1, rpc_addr: addr.clone(), ..Default::default() },
        );

        let manager = manager_with(desc);
        manager.reconcile_once().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let conn = manager.rpc_conn(&addr).expect("connection present after reconcile");
        assert!(conn.is_connected());

        // Next reconcile drops the address entirely.
        let empty_desc = TopologyDescriptor::default();
        manager.set_descriptor(empty_desc);
        manager.reconcile_once().await;
        assert!(manager.rpc_conn(&addr).is_none());
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn reconcile_db_reuses_session_by_address_across_ticks() {
        let mut desc = TopologyDescriptor::default();
        desc.region_map.insert(
            1,
            RegionDescriptor {
                id: 1,
                db: Some(RegionDb { addr: "db-addr".into(), name: "db-name".into() }),
                ..Default::default()
            },
        );

        let manager = manager_with(desc.clone());
        manager.reconcile_once().await;
        let first = manager.db_session("db-addr").unwrap();

        manager.reconcile_once().await;
        let second = manager.db_session("db-addr").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn reconcile_db_closes_removed_address() {
        let mut desc = TopologyDescriptor::default();
        desc.region_map.insert(
            1,
            RegionDescriptor {
                id: 1,
                db: Some(RegionDb { addr: "db-addr".into(), name: "db-name".into() }),
                ..Default::default()
            },
        );
        let manager = manager_with(desc);
        manager.reconcile_once().await;
        assert!(manager.db_session("db-addr").is_some());

        manager.set_descriptor(TopologyDescriptor::default());
        manager.reconcile_once().await;
        assert!(manager.db_session("db-addr").is_none());
    }
}
