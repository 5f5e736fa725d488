use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::route::RouteAdapter;
use crate::state::{check_ip_changes, ReconcileReport, SharedStore};
use crate::Result;

/// Periodically re-resolves every stored domain and repairs drifted routes
pub struct Reconciler {
    store: SharedStore,
    router: Arc<dyn RouteAdapter>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(store: SharedStore, router: Arc<dyn RouteAdapter>, interval: Duration) -> Self {
        Self {
            store,
            router,
            interval,
        }
    }

    /// Tick until shutdown. The first pass runs one full interval after start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.interval.is_zero() {
            info!("Reconciler disabled (check interval = 0)");
            let _ = shutdown.changed().await;
            return;
        }

        info!("Reconciler started: interval={}s", self.interval.as_secs());

        let mut ticker = tokio::time::interval(self.interval);
        // Skip the first tick (fires immediately)
        ticker.tick().await;

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("Reconciler received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    debug!("Running scheduled IP check");
                    match self.reconcile_now().await {
                        Ok(report) => {
                            if report.changed > 0 || report.failed > 0 {
                                info!(
                                    checked = report.checked,
                                    changed = report.changed,
                                    failed = report.failed,
                                    "scheduled IP check finished"
                                );
                            }
                        }
                        Err(e) => {
                            error!("Scheduled IP check failed: {}", e);
                        }
                    }
                }
            }
        }

        info!("Reconciler stopped");
    }

    /// Run one pass immediately
    pub async fn reconcile_now(&self) -> Result<ReconcileReport> {
        check_ip_changes(&self.store, self.router.as_ref()).await
    }
}
