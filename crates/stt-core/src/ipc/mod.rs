//! IPC module for daemon-client communication
//!
//! Line-oriented text requests over a Unix domain socket, answered with
//! newline-delimited JSON.

mod client;
pub mod dispatcher;
mod protocol;
mod server;

pub use client::{is_daemon_running, DaemonClient};
pub use protocol::*;
pub use server::{cleanup, DaemonServer};
