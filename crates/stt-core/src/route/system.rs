use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use super::{table, RouteAdapter};
use crate::config::RouteConfig;
use crate::{Error, Result};

/// Route adapter backed by the system resolver, `/proc/net/route` and the
/// `ip` utility.
pub struct SystemRouter {
    use_sudo: bool,
    ip_command: String,
    route_table_path: PathBuf,
}

impl SystemRouter {
    pub fn new(config: &RouteConfig) -> Self {
        Self {
            use_sudo: config.use_sudo,
            ip_command: config.ip_command.clone(),
            route_table_path: config.route_table_path.clone(),
        }
    }

    fn route_command(&self, args: &[String]) -> Command {
        let mut cmd = if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(&self.ip_command);
            cmd
        } else {
            Command::new(&self.ip_command)
        };
        cmd.arg("route").args(args);
        cmd
    }

    async fn run_route_command(
        &self,
        action: &'static str,
        ip: Ipv4Addr,
        gateway: Option<Ipv4Addr>,
        args: Vec<String>,
    ) -> Result<()> {
        debug!(action, %ip, ?gateway, "running route command");

        let output = self
            .route_command(&args)
            .output()
            .await
            .map_err(|e| Error::RouteCommand {
                action,
                ip,
                gateway,
                message: format!("failed to spawn {}: {}", self.ip_command, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            };
            return Err(Error::RouteCommand {
                action,
                ip,
                gateway,
                message,
            });
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl RouteAdapter for SystemRouter {
    async fn resolve_domain(&self, domain: &str) -> Result<Vec<Ipv4Addr>> {
        let addrs = tokio::net::lookup_host((domain, 0))
            .await
            .map_err(|e| Error::Resolve {
                domain: domain.to_string(),
                message: e.to_string(),
            })?;

        let mut ips: Vec<Ipv4Addr> = Vec::new();
        for addr in addrs {
            if let IpAddr::V4(ip) = addr.ip() {
                if !ips.contains(&ip) {
                    ips.push(ip);
                }
            }
        }

        if ips.is_empty() {
            return Err(Error::Resolve {
                domain: domain.to_string(),
                message: "no IPv4 addresses found".to_string(),
            });
        }

        debug!(domain, ips = ?ips, "resolved domain");
        Ok(ips)
    }

    async fn default_gateway(&self) -> Result<Ipv4Addr> {
        let content = tokio::fs::read_to_string(&self.route_table_path)
            .await
            .map_err(|e| {
                Error::RouteTable(format!("{}: {}", self.route_table_path.display(), e))
            })?;
        table::find_non_vpn_gateway(&content)
    }

    async fn add_route(&self, ip: Ipv4Addr, gateway: Ipv4Addr) -> Result<()> {
        let args = vec![
            "add".to_string(),
            ip.to_string(),
            "via".to_string(),
            gateway.to_string(),
        ];
        self.run_route_command("add", ip, Some(gateway), args).await
    }

    async fn remove_route(&self, ip: Ipv4Addr) -> Result<()> {
        let args = vec!["del".to_string(), ip.to_string()];
        self.run_route_command("remove", ip, None, args).await
    }
}
