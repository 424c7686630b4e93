//! Process entry point: parses the executable's own identity, loads config
//! and the server token, wires the Channel/RPC/topology fabric, then serves
//! one merged HTTP router (admin routes plus the `/ws` peer/client upgrade
//! route) until a shutdown signal arrives. Grounded on `app/app.go`'s
//! `Init`/`Exec` and `app/web_server.go`'s single `http.Server`.

mod collaborators;
mod identity;
mod lifecycle;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use step_board::{DeferredLeaderboard, InstantLeaderboard};
use step_locks::{NamedMutexRegistry, ServerToken};
use step_runtime::{ChannelRegistry, Dispatch};
use step_topology::{ConfigLoader, TopologyManager};
use step_types::TopologyDescriptor;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use collaborators::{NullDbPool, NullDocumentStore, NullKvPool, TracingLoggerSink, TracingStatsSink};
use lifecycle::{wait_for_shutdown_signal, Manager, ManagerRegistry};

struct TaskManager {
    name: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Manager for TaskManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        self.handle.abort();
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let identity = identity::parse_current_exe().unwrap_or_else(|e| {
        panic!("process identity check failed: {e}");
    });
    info!(env = %identity.env, node_type = %identity.node_type, id = identity.id, "process identity resolved");

    let config_path = std::env::var("STEP_CONFIG").unwrap_or_else(|_| "./config.json".into());
    let token_path = ServerToken::file_name(&identity.env, &identity.node_type, identity.id);

    let token = ServerToken::load(&token_path)
        .unwrap_or_else(|e| panic!("failed to load server token from {token_path}: {e}"));
    info!(token = token.get(), path = %token_path, "server token loaded");

    let loader = ConfigLoader::new(
        Arc::new(TracingLoggerSink),
        Arc::new(TracingStatsSink),
        Arc::new(NullDbPool),
        Arc::new(NullKvPool),
    );
    let descriptor = match std::fs::read(&config_path) {
        Ok(bytes) => loader.validate(&bytes).unwrap_or_else(|e| panic!("invalid config at {config_path}: {e}")),
        Err(e) => {
            warn!(path = %config_path, error = %e, "no config file found, starting with an empty topology");
            TopologyDescriptor::default()
        }
    };
    loader.apply(&descriptor, None);

    let mut dispatch = Dispatch::new();
    dispatch.set_lap_handler(step_web::channel_routed_lap_handler());
    let channels = ChannelRegistry::new(Arc::new(dispatch));

    let topology = TopologyManager::new(
        descriptor,
        Arc::new(NullDbPool),
        channels.clone(),
        identity.env.clone(),
        format!("{}_{}", identity.node_type, identity.id),
    );

    let named_mutexes = Arc::new(NamedMutexRegistry::new());

    let deferred_board = Arc::new(DeferredLeaderboard::new("season", 100, [10_000, 5_000, 1_000], NullDocumentStore));
    let instant_board = Arc::new(InstantLeaderboard::new("arena", 1_000, NullDocumentStore));

    let mut managers = ManagerRegistry::new();

    let topology_task = topology.clone().spawn();
    managers.register(Arc::new(TaskManager { name: "topology-reconcile".into(), handle: topology_task }));

    managers.register(Arc::new(TaskManager {
        name: "deferred-board-cadence".into(),
        handle: spawn_board_cadence(deferred_board.clone(), |b| b.sort()),
    }));
    managers.register(Arc::new(TaskManager {
        name: "instant-board-cadence".into(),
        handle: spawn_board_cadence(instant_board.clone(), |b| b.save()),
    }));

    let req_dispatch = Arc::new(step_web::ReqDispatch::new());
    let acceptor = step_web::Acceptor::new(channels.clone(), req_dispatch);

    let listen_addr = std::env::var("STEP_LISTEN").unwrap_or_else(|_| "0.0.0.0:9119".into());

    let listener = TcpListener::bind(&listen_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind listener on {listen_addr}: {e}"));
    info!(%listen_addr, "listener ready");

    let admin_token = std::env::var("STEP_ADMIN_TOKEN").unwrap_or_else(|_| "changeme".into());
    let mut admin_state = step_web::AdminState::new(admin_token, channels.clone());
    register_admin_routes(&mut admin_state, &token, &topology, &named_mutexes);
    let admin_router = step_web::router(Arc::new(admin_state));
    let app = admin_router.merge(acceptor.router());

    info!(type = %identity.node_type, id = identity.id, "server startup complete");

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            if let Err(e) = result {
                error!(error = %e, "http server error");
            }
        }
        _ = wait_for_shutdown_signal() => {}
    }

    managers.stop_all();
    info!(type = %identity.node_type, id = identity.id, "server exited");
}

fn spawn_board_cadence<B: Send + Sync + 'static>(board: Arc<B>, tick: impl Fn(&B) + Send + 'static) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            tick(&board);
        }
    })
}

fn register_admin_routes(
    state: &mut step_web::AdminState,
    token: &ServerToken,
    topology: &Arc<TopologyManager>,
    named_mutexes: &Arc<NamedMutexRegistry>,
) {
    let token_value = token.get();
    state.register_public(
        "/status",
        Arc::new(move |_req| {
            Box::pin(async move { step_web::AdminResponse::success(serde_json::json!({ "token": token_value })) })
        }),
    );

    let topology = topology.clone();
    let named_mutexes = named_mutexes.clone();
    state.register_private(
        "/topology",
        Arc::new(move |_req| {
            let topology = topology.clone();
            let named_mutexes = named_mutexes.clone();
            Box::pin(async move {
                named_mutexes.lock("topology-admin-read");
                let desc = topology.descriptor();
                named_mutexes.unlock("topology-admin-read");
                step_web::AdminResponse::success(serde_json::json!({
                    "app_name": desc.app_name,
                    "own_region_id": desc.own_region_id,
                    "region_count": desc.region_list.len(),
                }))
            })
        }),
    );
}
