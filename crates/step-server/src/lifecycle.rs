//! Manager registration and ordered shutdown. Grounded on `app/app.go`'s
//! `managers` slice and `Exec`'s shutdown section: every registered manager
//! is `Init`'d before the signal wait and `Stop`'d, in registration order,
//! after it.

use std::sync::Arc;

use tracing::info;

/// A long-lived subsystem with an explicit stop hook, run in registration
/// order on shutdown. `Init` has no counterpart here: a manager is already
/// live by the time it's registered, since construction in this codebase
/// is fallible and happens inline in `main` rather than through a second
/// phase.
pub trait Manager: Send + Sync {
    fn name(&self) -> &str;
    fn stop(&self);
}

#[derive(Default)]
pub struct ManagerRegistry {
    managers: Vec<Arc<dyn Manager>>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, manager: Arc<dyn Manager>) {
        self.managers.push(manager);
    }

    /// Runs every registered manager's `stop` in registration order.
    pub fn stop_all(&self) {
        for manager in &self.managers {
            info!(manager = manager.name(), "stopping manager");
            manager.stop();
        }
    }
}

/// Waits for SIGINT or SIGTERM, whichever arrives first.
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}
