//! IPC Client for connecting to daemon

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::protocol::{Command, DaemonResponse};
use crate::{Error, Result};

/// Client for communicating with the daemon
#[derive(Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub async fn add(&self, domains: Vec<String>) -> Result<Vec<DaemonResponse>> {
        self.send(&Command::Add(domains)).await
    }

    pub async fn remove(&self, domains: Vec<String>) -> Result<Vec<DaemonResponse>> {
        self.send(&Command::Remove(domains)).await
    }

    pub async fn list(&self) -> Result<DaemonResponse> {
        self.send_single(&Command::List).await
    }

    pub async fn purge(&self) -> Result<DaemonResponse> {
        self.send_single(&Command::Purge).await
    }

    async fn send_single(&self, command: &Command) -> Result<DaemonResponse> {
        self.send(command)
            .await?
            .pop()
            .ok_or_else(|| Error::Other("Empty response".to_string()))
    }

    /// Send one command and collect every response line it produces.
    ///
    /// The command goes through the daemon's own parser first, so blank or
    /// whitespace-joined domains are counted the way the daemon counts them.
    pub async fn send(&self, command: &Command) -> Result<Vec<DaemonResponse>> {
        let command = Command::parse(&command.to_line())?;

        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::Other(format!(
                "Failed to connect to daemon at {}: {}. Is the daemon running?",
                self.socket_path.display(),
                e
            ))
        })?;

        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(command.to_line().as_bytes()).await?;
        writer.flush().await?;

        let expected = command.expected_responses();
        let mut responses = Vec::with_capacity(expected);
        while responses.len() < expected {
            let line = lines.next_line().await?.ok_or_else(|| {
                Error::Other(format!(
                    "daemon closed the connection after {} of {} responses",
                    responses.len(),
                    expected
                ))
            })?;
            responses.push(DaemonResponse::from_ndjson_line(&line)?);
        }

        Ok(responses)
    }
}

/// Check if daemon is reachable
pub async fn is_daemon_running(socket_path: &Path) -> bool {
    UnixStream::connect(socket_path).await.is_ok()
}
