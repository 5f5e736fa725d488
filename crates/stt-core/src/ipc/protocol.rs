//! Wire protocol between the CLI and the daemon.
//!
//! Requests are single text lines (`<verb> [domain ...]\n`); every response is
//! one JSON object on its own line.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One response per unit of work (per domain for add/remove, per command
/// otherwise)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub success: bool,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub error: String,
}

impl DaemonResponse {
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: response.into(),
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: String::new(),
            error: error.into(),
        }
    }

    /// Attach non-fatal problems to an otherwise successful response
    pub fn with_warnings(mut self, warnings: &[String]) -> Self {
        self.error = warnings.join("; ");
        self
    }

    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }

    pub fn from_ndjson_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }
}

/// Verbs understood by the daemon
pub mod verbs {
    pub const ADD: &str = "add";
    pub const REMOVE: &str = "remove";
    pub const LIST: &str = "list";
    pub const PURGE: &str = "purge";
}

/// Human-readable messages shared by the daemon and its clients
pub mod messages {
    pub const NO_ROUTES_TO_PURGE: &str = "no routes to purge";
    pub const PURGED_ALL_ROUTES: &str = "purged all routes";
    pub const FAILED_TO_REMOVE_ENTRY: &str = "failed to remove RouteEntry from state";
    pub const FAILED_TO_RELOAD_STATE: &str = "failed to reload state";
    pub const FAILED_TO_GET_GATEWAY: &str = "failed to get default gateway";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(Vec<String>),
    Remove(Vec<String>),
    List,
    Purge,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty command received")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownVerb(String),

    #[error("missing domain argument for {0}")]
    MissingDomain(&'static str),
}

impl Command {
    /// Parse one request line. Extra arguments to `list` and `purge` are ignored.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(ProtocolError::Empty)?;
        let args: Vec<String> = parts.map(str::to_string).collect();

        match verb {
            verbs::ADD if args.is_empty() => Err(ProtocolError::MissingDomain(verbs::ADD)),
            verbs::ADD => Ok(Command::Add(args)),
            verbs::REMOVE if args.is_empty() => Err(ProtocolError::MissingDomain(verbs::REMOVE)),
            verbs::REMOVE => Ok(Command::Remove(args)),
            verbs::LIST => Ok(Command::List),
            verbs::PURGE => Ok(Command::Purge),
            other => Err(ProtocolError::UnknownVerb(other.to_string())),
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Add(_) => verbs::ADD,
            Command::Remove(_) => verbs::REMOVE,
            Command::List => verbs::LIST,
            Command::Purge => verbs::PURGE,
        }
    }

    /// Number of response lines the daemon writes for this command
    pub fn expected_responses(&self) -> usize {
        match self {
            Command::Add(domains) | Command::Remove(domains) => domains.len(),
            Command::List | Command::Purge => 1,
        }
    }

    /// Request line, newline-terminated
    pub fn to_line(&self) -> String {
        match self {
            Command::Add(domains) | Command::Remove(domains) => {
                format!("{} {}\n", self.verb(), domains.join(" "))
            }
            Command::List | Command::Purge => format!("{}\n", self.verb()),
        }
    }
}
