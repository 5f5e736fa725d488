//! Daemon wiring: state store, IPC server and reconciler sharing one lock.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::DaemonOptions;
use crate::ipc::DaemonServer;
use crate::reconciler::Reconciler;
use crate::route::RouteAdapter;
use crate::state::EntryStore;
use crate::Result;

pub struct Daemon {
    options: DaemonOptions,
    router: Arc<dyn RouteAdapter>,
}

impl Daemon {
    pub fn new(options: DaemonOptions, router: Arc<dyn RouteAdapter>) -> Self {
        Self { options, router }
    }

    /// Load state, bind the socket and serve until `shutdown_rx` flips to true.
    ///
    /// Fails before accepting anything if the state file or the socket
    /// cannot be set up.
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        if self.options.verbose {
            debug!(options = ?self.options, "starting daemon");
        }
        let store = EntryStore::open(&self.options.state_path).await?;
        info!(
            entries = store.len(),
            path = %self.options.state_path.display(),
            "state loaded"
        );
        let store = store.into_shared();

        let server = DaemonServer::new(store.clone(), self.router.clone(), self.options.socket_path.clone());
        let listener = server.bind()?;

        let reconciler = Reconciler::new(store, self.router, self.options.check_interval);
        let reconciler_handle = tokio::spawn(reconciler.run(shutdown_rx.clone()));

        let served = server.serve(listener, shutdown_rx).await;

        if let Err(e) = reconciler_handle.await {
            error!("Reconciler task failed: {}", e);
        }

        info!("Daemon stopped");
        served
    }
}
