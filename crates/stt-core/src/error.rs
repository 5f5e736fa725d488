use std::net::Ipv4Addr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to resolve domain {domain}: {message}")]
    Resolve { domain: String, message: String },

    #[error("failed to open routing info file: {0}")]
    RouteTable(String),

    #[error("non-VPN gateway not found")]
    GatewayNotFound,

    #[error("invalid gateway field {0:?}: {1}")]
    InvalidGateway(String, String),

    #[error("failed to {action} route for {ip}{}: {message}", via_suffix(.gateway))]
    RouteCommand {
        action: &'static str,
        ip: Ipv4Addr,
        gateway: Option<Ipv4Addr>,
        message: String,
    },

    #[error("route entry already exists in state: {0}")]
    EntryAlreadyExists(String),

    #[error("route entry not found in state: {0}")]
    EntryNotFound(String),

    #[error("invalid command: {0}")]
    Protocol(#[from] crate::ipc::ProtocolError),

    #[error("{0}")]
    Other(String),
}

fn via_suffix(gateway: &Option<Ipv4Addr>) -> String {
    match gateway {
        Some(gw) => format!(" via {}", gw),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
