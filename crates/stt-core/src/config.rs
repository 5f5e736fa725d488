use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub route: RouteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the state file and the socket unless overridden
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Verbose (debug) logging
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket path (defaults to `<data_dir>/ipc.sock`)
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    /// State file path (defaults to `<data_dir>/state.json`)
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// DNS re-check interval in minutes (0 = disabled)
    #[serde(default = "default_check_interval_min")]
    pub check_interval_min: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            state_path: None,
            check_interval_min: default_check_interval_min(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Prefix route commands with `sudo`
    #[serde(default = "default_true")]
    pub use_sudo: bool,
    /// Route management utility
    #[serde(default = "default_ip_command")]
    pub ip_command: String,
    /// Kernel IPv4 routing table
    #[serde(default = "default_route_table_path")]
    pub route_table_path: PathBuf,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            use_sudo: default_true(),
            ip_command: default_ip_command(),
            route_table_path: default_route_table_path(),
        }
    }
}

/// Resolved values the daemon core is constructed with.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub socket_path: PathBuf,
    pub state_path: PathBuf,
    pub check_interval: Duration,
    pub verbose: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.split-the-tunnel")
}

fn default_check_interval_min() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_ip_command() -> String {
    "ip".to_string()
}

fn default_route_table_path() -> PathBuf {
    PathBuf::from("/proc/net/route")
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path; a missing file yields defaults
    pub fn load_from(config_path: &std::path::Path) -> crate::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("split-the-tunnel")
            .join("config.toml")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }

    /// Get the Unix socket path for IPC
    pub fn socket_path(&self) -> PathBuf {
        match &self.daemon.socket_path {
            Some(path) => expand_tilde(path),
            None => self.data_dir().join("ipc.sock"),
        }
    }

    /// Get the persisted state file path
    pub fn state_path(&self) -> PathBuf {
        match &self.daemon.state_path {
            Some(path) => expand_tilde(path),
            None => self.data_dir().join("state.json"),
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.check_interval_min * 60)
    }

    pub fn daemon_options(&self) -> DaemonOptions {
        DaemonOptions {
            socket_path: self.socket_path(),
            state_path: self.state_path(),
            check_interval: self.check_interval(),
            verbose: self.general.verbose,
        }
    }
}
