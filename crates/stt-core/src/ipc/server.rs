//! IPC Server for daemon
//!
//! Listens on a Unix socket and feeds each received line to the dispatcher.
//! Responses are written after the store lock is released.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::dispatcher;
use super::protocol::DaemonResponse;
use crate::route::RouteAdapter;
use crate::state::SharedStore;
use crate::Result;

/// IPC Server that handles client connections
pub struct DaemonServer {
    store: SharedStore,
    router: Arc<dyn RouteAdapter>,
    socket_path: PathBuf,
}

impl DaemonServer {
    pub fn new(store: SharedStore, router: Arc<dyn RouteAdapter>, socket_path: PathBuf) -> Self {
        Self {
            store,
            router,
            socket_path,
        }
    }

    /// Bind the socket, replacing a file left behind by an unclean shutdown.
    ///
    /// A second daemon on the same path takes the socket over from the first.
    pub fn bind(&self) -> Result<UnixListener> {
        if self.socket_path.exists() {
            warn!("Removing existing socket file: {}", self.socket_path.display());
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on: {}", self.socket_path.display());
        Ok(listener)
    }

    /// Accept connections until shutdown, then remove the socket file.
    ///
    /// Connections still open at shutdown are not drained.
    pub async fn serve(&self, listener: UnixListener, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let store = self.store.clone();
                            let router = self.router.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, store, router).await {
                                    warn!("Error handling connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("IPC server shutting down");
                        break;
                    }
                }
            }
        }

        drop(listener);
        if let Err(e) = cleanup(&self.socket_path) {
            error!("Failed to cleanup IPC socket: {}", e);
        }
        Ok(())
    }
}

/// Remove the socket file
pub fn cleanup(path: &Path) -> Result<()> {
    std::fs::remove_file(path)?;
    debug!("Removed socket file: {}", path.display());
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    store: SharedStore,
    router: Arc<dyn RouteAdapter>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        info!(command, "received command");

        let responses = dispatcher::dispatch(command, &store, router.as_ref()).await;
        for response in &responses {
            write_response(&mut writer, response).await?;
        }
    }

    debug!("Connection closed");
    Ok(())
}

/// Serialize and send one newline-terminated response
async fn write_response<W>(writer: &mut W, response: &DaemonResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = response.to_ndjson_line()?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
