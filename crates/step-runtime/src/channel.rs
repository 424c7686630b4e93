//! Per-key serial executor. Grounded on `app/channel.go`: two bounded
//! queues, a single worker selecting nondeterministically between them and
//! a one-minute ticker, idle-based self-unregistration, and panic isolation
//! (a worker fault unregisters the channel instead of taking the process
//! down).

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::dispatch::Dispatch;
use crate::error::ChannelError;
use crate::registry::ChannelRegistry;
use crate::rpc_conn::RpcConnection;

pub const EMPTY_KEY_QUEUE_CAPACITY: usize = 100_000;
pub const KEYED_QUEUE_CAPACITY: usize = 1_024;
pub const IDLE_RECYCLE_MINUTES: u32 = 10;

pub struct RpcEntry {
    pub call_id: u16,
    pub code: u16,
    pub channel_key: String,
    pub body: Vec<u8>,
    pub conn: Option<Arc<RpcConnection>>,
}

pub struct LapEntry {
    pub channel_key: String,
    pub payload: Box<dyn Any + Send>,
}

/// Handle to a running Channel worker. Enqueue operations never block: a
/// full queue is reported back to the caller immediately as `QueueFull`.
pub struct ChannelHandle {
    key: String,
    rpc_tx: mpsc::Sender<Option<RpcEntry>>,
    lap_tx: mpsc::Sender<Option<LapEntry>>,
    alive: Arc<AtomicBool>,
}

impl ChannelHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn enqueue_rpc(&self, entry: RpcEntry) -> Result<(), ChannelError> {
        self.rpc_tx
            .try_send(Some(entry))
            .map_err(|_| ChannelError::QueueFull { key: self.key.clone() })
    }

    pub fn enqueue_lap(&self, entry: LapEntry) -> Result<(), ChannelError> {
        self.lap_tx
            .try_send(Some(entry))
            .map_err(|_| ChannelError::QueueFull { key: self.key.clone() })
    }

    /// Spawns a worker for `key`, using the queue capacity convention from
    /// the data model (100,000 for the broadcast lane, 1,024 otherwise).
    pub fn spawn(key: String, dispatch: Arc<Dispatch>, registry: Weak<ChannelRegistry>) -> Arc<Self> {
        let capacity = if key.is_empty() { EMPTY_KEY_QUEUE_CAPACITY } else { KEYED_QUEUE_CAPACITY };
        Self::spawn_with(key, capacity, Duration::from_secs(60), IDLE_RECYCLE_MINUTES, dispatch, registry)
    }

    /// Full constructor used by tests to shrink capacity and tick interval
    /// so overflow and idle-reclamation properties can be exercised without
    /// real wall-clock minutes or 100k-item floods.
    pub fn spawn_with(
        key: String,
        capacity: usize,
        tick: Duration,
        idle_limit: u32,
        dispatch: Arc<Dispatch>,
        registry: Weak<ChannelRegistry>,
    ) -> Arc<Self> {
        let (rpc_tx, rpc_rx) = mpsc::channel(capacity);
        let (lap_tx, lap_rx) = mpsc::channel(capacity);
        let alive = Arc::new(AtomicBool::new(true));

        let handle = Arc::new(Self { key: key.clone(), rpc_tx, lap_tx, alive: alive.clone() });

        let panic_key = key.clone();
        let panic_registry = registry.clone();
        let panic_alive = alive.clone();
        let shutdown_rpc_tx = handle.rpc_tx.clone();
        let shutdown_lap_tx = handle.lap_tx.clone();
        tokio::spawn(async move {
            let worker = tokio::spawn(run_worker(
                key,
                rpc_rx,
                lap_rx,
                tick,
                idle_limit,
                dispatch,
                registry,
                alive,
                shutdown_rpc_tx,
                shutdown_lap_tx,
            ));
            if worker.await.is_err() {
                error!(channel_key = %panic_key, "channel worker panicked, unregistering");
                panic_alive.store(false, Ordering::Release);
                if let Some(registry) = panic_registry.upgrade() {
                    registry.remove(&panic_key);
                }
            }
        });

        handle
    }
}

async fn run_worker(
    key: String,
    mut rpc_rx: mpsc::Receiver<Option<RpcEntry>>,
    mut lap_rx: mpsc::Receiver<Option<LapEntry>>,
    tick: Duration,
    idle_limit: u32,
    dispatch: Arc<Dispatch>,
    registry: Weak<ChannelRegistry>,
    alive: Arc<AtomicBool>,
    rpc_tx: mpsc::Sender<Option<RpcEntry>>,
    lap_tx: mpsc::Sender<Option<LapEntry>>,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.tick().await; // first tick fires immediately; consume it

    let mut idle = 0u32;
    let mut rpc_done = false;
    let mut lap_done = false;
    let mut shutting_down = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                idle += 1;
                if idle >= idle_limit && !shutting_down {
                    shutting_down = true;
                    if let Some(registry) = registry.upgrade() {
                        registry.remove(&key);
                    }
                    // Unregistered first so no new caller can find this key; any
                    // entry already `try_send`'d into either queue ahead of these
                    // sentinels is still drained by the match arms below before
                    // the loop breaks.
                    let _ = rpc_tx.try_send(None);
                    let _ = lap_tx.try_send(None);
                }
            }
            entry = rpc_rx.recv() => {
                match entry {
                    None => break,
                    Some(None) => {
                        rpc_done = true;
                        if lap_done { break; }
                    }
                    Some(Some(rpc)) => {
                        idle = 0;
                        dispatch_rpc(&dispatch, rpc).await;
                    }
                }
            }
            entry = lap_rx.recv() => {
                match entry {
                    None => break,
                    Some(None) => {
                        lap_done = true;
                        if rpc_done { break; }
                    }
                    Some(Some(lap)) => {
                        idle = 0;
                        dispatch_lap(&dispatch, lap).await;
                    }
                }
            }
        }
    }

    alive.store(false, Ordering::Release);
}

async fn dispatch_rpc(dispatch: &Dispatch, rpc: RpcEntry) {
    let code = rpc.code;
    match dispatch.rpc_handler_for(code) {
        Some(handler) => handler(rpc).await,
        None => error!(code, "no handler registered for rpc code"),
    }
}

async fn dispatch_lap(dispatch: &Dispatch, lap: LapEntry) {
    match dispatch.lap_handler() {
        Some(handler) => handler(lap).await,
        None => warn!(channel_key = %lap.channel_key, "no lap handler registered"),
    }
}
