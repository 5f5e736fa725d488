use std::collections::HashSet;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Traffic to `resolved_ips`, reached via `domain`, goes through `gateway`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub domain: String,
    pub gateway: Ipv4Addr,
    #[serde(rename = "resolvedIPs", default)]
    pub resolved_ips: Vec<Ipv4Addr>,
}

impl RouteEntry {
    /// Build an entry; duplicate IPs are dropped, first occurrence order kept.
    pub fn new(
        domain: impl Into<String>,
        gateway: Ipv4Addr,
        resolved_ips: impl IntoIterator<Item = Ipv4Addr>,
    ) -> Self {
        Self {
            domain: domain.into(),
            gateway,
            resolved_ips: dedup_ips(resolved_ips),
        }
    }

    pub fn has_ip_set(&self, ips: &[Ipv4Addr]) -> bool {
        same_ip_set(&self.resolved_ips, ips)
    }
}

/// On-disk document: `{"entries": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub entries: Vec<RouteEntry>,
}

pub fn dedup_ips(ips: impl IntoIterator<Item = Ipv4Addr>) -> Vec<Ipv4Addr> {
    let mut seen = HashSet::new();
    ips.into_iter().filter(|ip| seen.insert(*ip)).collect()
}

/// Order-independent comparison, duplicates collapsed.
pub fn same_ip_set(a: &[Ipv4Addr], b: &[Ipv4Addr]) -> bool {
    let a: HashSet<_> = a.iter().collect();
    let b: HashSet<_> = b.iter().collect();
    a == b
}

/// Split a change from `old` to `new` into (dropped, added) addresses.
pub fn ip_diff(old: &[Ipv4Addr], new: &[Ipv4Addr]) -> (Vec<Ipv4Addr>, Vec<Ipv4Addr>) {
    let dropped = old.iter().filter(|ip| !new.contains(ip)).copied().collect();
    let added = new.iter().filter(|ip| !old.contains(ip)).copied().collect();
    (dropped, added)
}
