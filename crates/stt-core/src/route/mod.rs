//! Route adapter: DNS resolution, default gateway discovery and kernel route
//! add/remove.
//!
//! Everything that touches the operating system goes through [`RouteAdapter`],
//! so the store, dispatcher and reconciler can run against a recording mock.

mod system;
pub mod table;

#[cfg(test)]
pub(crate) mod mock;

pub use system::SystemRouter;
pub use table::find_non_vpn_gateway;

use std::net::Ipv4Addr;

use crate::Result;

/// Operating system routing operations used by the daemon
#[async_trait::async_trait]
pub trait RouteAdapter: Send + Sync {
    /// Resolve a domain to its IPv4 addresses (IPv6 answers are dropped)
    async fn resolve_domain(&self, domain: &str) -> Result<Vec<Ipv4Addr>>;

    /// Gateway of the default route that is not the VPN's
    async fn default_gateway(&self) -> Result<Ipv4Addr>;

    /// Install a host route for `ip` via `gateway`
    async fn add_route(&self, ip: Ipv4Addr, gateway: Ipv4Addr) -> Result<()>;

    /// Delete the host route for `ip`
    async fn remove_route(&self, ip: Ipv4Addr) -> Result<()>;
}
