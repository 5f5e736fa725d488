use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use stt_core::ipc::is_daemon_running;
use stt_core::{AppConfig, Daemon, SystemRouter};

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    tokio::signal::ctrl_c().await.ok();
}

/// Run the daemon in the foreground until a shutdown signal arrives
pub async fn run(config: &AppConfig) -> Result<()> {
    let options = config.daemon_options();
    if is_daemon_running(&options.socket_path).await {
        bail!("Daemon is already running on {}", options.socket_path.display());
    }

    let router = Arc::new(SystemRouter::new(&config.route));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    info!(
        socket = %options.socket_path.display(),
        state = %options.state_path.display(),
        check_interval_secs = options.check_interval.as_secs(),
        "Starting split-the-tunnel daemon"
    );

    Daemon::new(options, router).run(shutdown_rx).await?;
    Ok(())
}
