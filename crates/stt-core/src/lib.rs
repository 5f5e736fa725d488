pub mod config;
pub mod daemon;
pub mod error;
pub mod ipc;
pub mod reconciler;
pub mod route;
pub mod state;

pub use config::{AppConfig, DaemonOptions};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use ipc::{DaemonClient, DaemonServer};
pub use route::{RouteAdapter, SystemRouter};
pub use state::{EntryStore, RouteEntry, SharedStore};
