//! Recording route adapter for tests.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use super::RouteAdapter;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCall {
    Add(Ipv4Addr, Ipv4Addr),
    Remove(Ipv4Addr),
}

pub struct MockRouter {
    dns: Mutex<HashMap<String, Vec<Ipv4Addr>>>,
    gateway: Mutex<Option<Ipv4Addr>>,
    failing_ips: Mutex<HashSet<Ipv4Addr>>,
    calls: Mutex<Vec<RouteCall>>,
    lookups: Mutex<Vec<String>>,
}

impl MockRouter {
    pub fn new(gateway: Ipv4Addr) -> Self {
        Self {
            dns: Mutex::new(HashMap::new()),
            gateway: Mutex::new(Some(gateway)),
            failing_ips: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn with_dns(self, domain: &str, ips: &[&str]) -> Self {
        self.set_dns(domain, ips);
        self
    }

    pub fn set_dns(&self, domain: &str, ips: &[&str]) {
        let ips = ips.iter().map(|ip| ip.parse().unwrap()).collect();
        self.dns.lock().unwrap().insert(domain.to_string(), ips);
    }

    pub fn set_gateway(&self, gateway: Option<Ipv4Addr>) {
        *self.gateway.lock().unwrap() = gateway;
    }

    pub fn fail_routes_for(&self, ip: &str) {
        self.failing_ips.lock().unwrap().insert(ip.parse().unwrap());
    }

    pub fn calls(&self) -> Vec<RouteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    fn record(&self, call: RouteCall, ip: Ipv4Addr, gateway: Option<Ipv4Addr>) -> Result<()> {
        let action = match call {
            RouteCall::Add(..) => "add",
            RouteCall::Remove(_) => "remove",
        };
        self.calls.lock().unwrap().push(call);
        if self.failing_ips.lock().unwrap().contains(&ip) {
            return Err(Error::RouteCommand {
                action,
                ip,
                gateway,
                message: "exit status: 2".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RouteAdapter for MockRouter {
    async fn resolve_domain(&self, domain: &str) -> Result<Vec<Ipv4Addr>> {
        self.lookups.lock().unwrap().push(domain.to_string());
        self.dns
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .ok_or_else(|| Error::Resolve {
                domain: domain.to_string(),
                message: "no such host".to_string(),
            })
    }

    async fn default_gateway(&self) -> Result<Ipv4Addr> {
        self.gateway.lock().unwrap().ok_or(Error::GatewayNotFound)
    }

    async fn add_route(&self, ip: Ipv4Addr, gateway: Ipv4Addr) -> Result<()> {
        self.record(RouteCall::Add(ip, gateway), ip, Some(gateway))
    }

    async fn remove_route(&self, ip: Ipv4Addr) -> Result<()> {
        self.record(RouteCall::Remove(ip), ip, None)
    }
}
