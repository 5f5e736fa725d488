//! Executes parsed commands against the store and the route adapter.
//!
//! Each command yields exactly one response per unit of work: one per domain
//! for `add`/`remove`, one for `list`/`purge`, one for a malformed line. An
//! empty line is logged and yields none.
//!
//! The store lock covers only the reload and the state change of one unit.
//! DNS lookups and route commands run outside it, and responses are returned
//! to the caller instead of being written here.

use tracing::{debug, error, info, warn};

use super::protocol::{messages, Command, DaemonResponse, ProtocolError};
use crate::route::RouteAdapter;
use crate::state::{ip_diff, RouteEntry, SharedStore, Upsert};
use crate::Error;

/// Handle one request line
pub async fn dispatch(line: &str, store: &SharedStore, router: &dyn RouteAdapter) -> Vec<DaemonResponse> {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(ProtocolError::Empty) => {
            error!("{}", ProtocolError::Empty);
            return Vec::new();
        }
        Err(e) => {
            warn!(line, error = %e, "rejecting command");
            return vec![DaemonResponse::failure(e.to_string())];
        }
    };

    debug!(operation = command.verb(), "processing command");

    match command {
        Command::Add(domains) => {
            let mut responses = Vec::with_capacity(domains.len());
            for domain in &domains {
                responses.push(add_domain(domain, store, router).await);
            }
            responses
        }
        Command::Remove(domains) => {
            let mut responses = Vec::with_capacity(domains.len());
            for domain in &domains {
                responses.push(remove_domain(domain, store, router).await);
            }
            responses
        }
        Command::List => vec![list(store).await],
        Command::Purge => vec![purge(store, router).await],
    }
}

fn reload_failure(operation: &str, e: &Error) -> DaemonResponse {
    error!(operation, error = %e, "{}", messages::FAILED_TO_RELOAD_STATE);
    DaemonResponse::failure(format!("{}: {}", messages::FAILED_TO_RELOAD_STATE, e))
}

async fn add_domain(domain: &str, store: &SharedStore, router: &dyn RouteAdapter) -> DaemonResponse {
    let ips = match router.resolve_domain(domain).await {
        Ok(ips) => ips,
        Err(e) => {
            warn!(operation = "add", domain, error = %e, "failed to resolve domain");
            return DaemonResponse::failure(e.to_string());
        }
    };

    // Looked up per domain
    let gateway = match router.default_gateway().await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(operation = "add", domain, error = %e, "{}", messages::FAILED_TO_GET_GATEWAY);
            return DaemonResponse::failure(format!("{}: {}", messages::FAILED_TO_GET_GATEWAY, e));
        }
    };

    let entry = RouteEntry::new(domain, gateway, ips);
    let upsert = {
        let mut store = store.lock().await;
        if let Err(e) = store.reload().await {
            return reload_failure("add", &e);
        }
        match store.add_entry(entry.clone()).await {
            Ok(upsert) => upsert,
            Err(e) => {
                error!(operation = "add", domain, error = %e, "failed to add route to state");
                return DaemonResponse::failure(format!(
                    "failed to write RouteEntry to state for domain {}: {}",
                    domain, e
                ));
            }
        }
    };

    // Routes via a replaced gateway are all stale
    let stale = match upsert {
        Upsert::Inserted => Vec::new(),
        Upsert::Updated { previous } if previous.gateway != gateway => previous.resolved_ips,
        Upsert::Updated { previous } => ip_diff(&previous.resolved_ips, &entry.resolved_ips).0,
    };

    let mut warnings = Vec::new();
    for ip in stale {
        if let Err(e) = router.remove_route(ip).await {
            warn!(operation = "add", domain, %ip, error = %e, "failed to remove stale route");
            warnings.push(e.to_string());
        }
    }

    for ip in &entry.resolved_ips {
        if let Err(e) = router.add_route(*ip, gateway).await {
            error!(operation = "add", domain, %ip, error = %e, "failed to add route to routing table");
            warnings.push(e.to_string());
        }
    }

    info!(operation = "add", domain, %gateway, ips = ?entry.resolved_ips, "successfully added route to routing table");
    DaemonResponse::success(format!("added route for {}", domain)).with_warnings(&warnings)
}

async fn remove_domain(domain: &str, store: &SharedStore, router: &dyn RouteAdapter) -> DaemonResponse {
    let ips = {
        let mut store = store.lock().await;
        if let Err(e) = store.reload().await {
            return reload_failure("remove", &e);
        }

        let Some(ips) = store.get_entry(domain).map(|e| e.resolved_ips.clone()) else {
            let e = Error::EntryNotFound(domain.to_string());
            warn!(operation = "remove", domain, "{}", e);
            return DaemonResponse::failure(format!("{}: {}", messages::FAILED_TO_REMOVE_ENTRY, e));
        };

        if let Err(e) = store.remove_entry(domain).await {
            error!(operation = "remove", domain, error = %e, "failed to remove route from state");
            return DaemonResponse::failure(format!("{}: {}", messages::FAILED_TO_REMOVE_ENTRY, e));
        }
        ips
    };

    let mut warnings = Vec::new();
    for ip in ips {
        if let Err(e) = router.remove_route(ip).await {
            error!(operation = "remove", domain, %ip, error = %e, "failed to remove route from routing table");
            warnings.push(e.to_string());
        }
    }

    info!(operation = "remove", domain, "successfully removed route from routing table");
    DaemonResponse::success(format!("removed route for {}", domain)).with_warnings(&warnings)
}

async fn list(store: &SharedStore) -> DaemonResponse {
    let mut store = store.lock().await;
    if let Err(e) = store.reload().await {
        return reload_failure("list", &e);
    }

    match store.to_json() {
        Ok(json) => DaemonResponse::success(json),
        Err(e) => {
            error!(operation = "list", error = %e, "failed to marshal entries");
            DaemonResponse::failure(format!("failed to marshal entries: {}", e))
        }
    }
}

async fn purge(store: &SharedStore, router: &dyn RouteAdapter) -> DaemonResponse {
    let removed = {
        let mut store = store.lock().await;
        if let Err(e) = store.reload().await {
            return reload_failure("purge", &e);
        }

        if store.is_empty() {
            info!(operation = "purge", "{}", messages::NO_ROUTES_TO_PURGE);
            return DaemonResponse::failure(messages::NO_ROUTES_TO_PURGE);
        }

        let removed = store.entries().to_vec();
        if let Err(e) = store.purge().await {
            error!(operation = "purge", error = %e, "failed to write state to file");
            return DaemonResponse::failure(format!("failed to write state to file: {}", e));
        }
        removed
    };

    let mut warnings = Vec::new();
    for entry in &removed {
        for ip in &entry.resolved_ips {
            if let Err(e) = router.remove_route(*ip).await {
                error!(operation = "purge", domain = %entry.domain, %ip, error = %e, "failed to remove route from routing table");
                warnings.push(e.to_string());
            }
        }
        debug!(operation = "purge", domain = %entry.domain, "removed routes for domain");
    }

    info!(operation = "purge", "{}", messages::PURGED_ALL_ROUTES);
    DaemonResponse::success(messages::PURGED_ALL_ROUTES).with_warnings(&warnings)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    use super::*;
    use crate::route::mock::{MockRouter, RouteCall};
    use crate::state::EntryStore;

    const GW: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        store: SharedStore,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.json");
            let store = EntryStore::open(&path).await.unwrap().into_shared();
            Self { _dir: dir, path, store }
        }

        async fn run(&self, line: &str, router: &MockRouter) -> Vec<DaemonResponse> {
            dispatch(line, &self.store, router).await
        }

        async fn entries(&self) -> Vec<RouteEntry> {
            self.store.lock().await.entries().to_vec()
        }

        async fn entry(&self, domain: &str) -> Option<RouteEntry> {
            self.store.lock().await.get_entry(domain).cloned()
        }
    }

    #[tokio::test]
    async fn test_add_installs_one_route_per_ip() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("example.com", &["93.184.216.34"]);

        let responses = fx.run("add example.com", &router).await;

        assert_eq!(responses, vec![DaemonResponse::success("added route for example.com")]);
        assert_eq!(
            fx.entries().await,
            vec![RouteEntry::new("example.com", GW, vec!["93.184.216.34".parse().unwrap()])]
        );
        assert_eq!(router.calls(), vec![RouteCall::Add("93.184.216.34".parse().unwrap(), GW)]);
    }

    #[tokio::test]
    async fn test_add_batch_continues_after_resolution_failure() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("good.com", &["1.1.1.1", "2.2.2.2"]);

        let responses = fx.run("add bad.invalid good.com", &router).await;

        assert_eq!(responses.len(), 2);
        assert!(!responses[0].success);
        assert!(responses[0].error.contains("failed to resolve domain bad.invalid"));
        assert!(responses[1].success);
        assert_eq!(fx.entries().await.len(), 1);
        assert_eq!(router.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_add_fetches_gateway_for_each_domain() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW)
            .with_dns("a.com", &["1.1.1.1"])
            .with_dns("b.com", &["2.2.2.2"]);

        fx.run("add a.com", &router).await;
        let second_gw = Ipv4Addr::new(10, 0, 0, 1);
        router.set_gateway(Some(second_gw));
        fx.run("add b.com", &router).await;

        assert_eq!(fx.entry("a.com").await.unwrap().gateway, GW);
        assert_eq!(fx.entry("b.com").await.unwrap().gateway, second_gw);
    }

    #[tokio::test]
    async fn test_add_without_gateway_fails_that_domain() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("a.com", &["1.1.1.1"]);
        router.set_gateway(None);

        let responses = fx.run("add a.com", &router).await;
        assert!(!responses[0].success);
        assert!(responses[0].error.contains("non-VPN gateway not found"));
        assert!(fx.entries().await.is_empty());
        assert!(router.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_existing_domain_is_reported() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("a.com", &["1.1.1.1"]);

        fx.run("add a.com", &router).await;
        let responses = fx.run("add a.com", &router).await;

        assert!(!responses[0].success);
        assert!(responses[0].error.contains("already exists"));
        assert_eq!(fx.entries().await.len(), 1);
        assert_eq!(router.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_re_add_with_new_ips_replaces_routes() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("a.com", &["1.1.1.1", "2.2.2.2"]);
        fx.run("add a.com", &router).await;

        router.set_dns("a.com", &["2.2.2.2", "3.3.3.3"]);
        let responses = fx.run("add a.com", &router).await;

        assert!(responses[0].success);
        let calls = router.calls();
        assert!(calls.contains(&RouteCall::Remove("1.1.1.1".parse().unwrap())));
        assert!(!calls.contains(&RouteCall::Remove("2.2.2.2".parse().unwrap())));
        assert!(calls.contains(&RouteCall::Add("3.3.3.3".parse().unwrap(), GW)));
        assert_eq!(fx.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_re_add_after_gateway_change_moves_every_route() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("a.com", &["1.1.1.1", "2.2.2.2"]);
        fx.run("add a.com", &router).await;

        let new_gw = Ipv4Addr::new(10, 0, 0, 1);
        router.set_gateway(Some(new_gw));
        router.set_dns("a.com", &["2.2.2.2", "3.3.3.3"]);
        let responses = fx.run("add a.com", &router).await;

        assert!(responses[0].success);
        assert_eq!(fx.entry("a.com").await.unwrap().gateway, new_gw);
        assert_eq!(
            router.calls()[2..],
            [
                RouteCall::Remove("1.1.1.1".parse().unwrap()),
                RouteCall::Remove("2.2.2.2".parse().unwrap()),
                RouteCall::Add("2.2.2.2".parse().unwrap(), new_gw),
                RouteCall::Add("3.3.3.3".parse().unwrap(), new_gw),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_reports_route_failures_without_stopping() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("a.com", &["1.1.1.1", "2.2.2.2"]);
        router.fail_routes_for("1.1.1.1");

        let responses = fx.run("add a.com", &router).await;

        assert_eq!(responses.len(), 1);
        assert!(responses[0].success);
        assert!(responses[0].error.contains("1.1.1.1"));
        assert_eq!(router.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_add_persist_failure_keeps_entry_in_memory() {
        let fx = Fixture::new().await;
        let mut tmp = fx.path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::create_dir(PathBuf::from(tmp)).unwrap();
        let router = MockRouter::new(GW).with_dns("a.com", &["1.1.1.1"]);

        let responses = fx.run("add a.com", &router).await;

        assert_eq!(responses.len(), 1);
        assert!(!responses[0].success);
        assert!(responses[0]
            .error
            .starts_with("failed to write RouteEntry to state for domain a.com"));
        assert!(fx.entry("a.com").await.is_some());
        assert!(router.calls().is_empty());
        assert_eq!(fs::read_to_string(&fx.path).unwrap(), r#"{"entries":[]}"#);
    }

    #[tokio::test]
    async fn test_remove_unknown_domain() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("a.com", &["1.1.1.1"]);
        fx.run("add a.com", &router).await;

        let responses = fx.run("remove nope.com", &router).await;

        assert_eq!(responses.len(), 1);
        assert!(!responses[0].success);
        assert!(responses[0].error.contains("entry not found"));
        assert_eq!(fx.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_deletes_entry_and_routes() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW)
            .with_dns("a.com", &["1.1.1.1", "2.2.2.2"])
            .with_dns("b.com", &["3.3.3.3"]);
        fx.run("add a.com b.com", &router).await;

        let responses = fx.run("remove a.com nope.com", &router).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], DaemonResponse::success("removed route for a.com"));
        assert!(!responses[1].success);
        assert!(fx.entry("a.com").await.is_none());
        assert_eq!(fx.entries().await.len(), 1);
        let removals: Vec<_> = router
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RouteCall::Remove(_)))
            .collect();
        assert_eq!(
            removals,
            vec![
                RouteCall::Remove("1.1.1.1".parse().unwrap()),
                RouteCall::Remove("2.2.2.2".parse().unwrap()),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_returns_entries_as_json() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW).with_dns("a.com", &["1.1.1.1"]);

        let empty = fx.run("list", &router).await;
        assert_eq!(empty, vec![DaemonResponse::success("[]")]);

        fx.run("add a.com", &router).await;
        let responses = fx.run("list", &router).await;
        assert_eq!(responses.len(), 1);
        let entries: Vec<RouteEntry> = serde_json::from_str(&responses[0].response).unwrap();
        assert_eq!(entries, fx.entries().await);
    }

    #[tokio::test]
    async fn test_purge_empty_store_does_nothing() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW);
        let before = fs::metadata(&fx.path).unwrap().modified().unwrap();

        let responses = fx.run("purge", &router).await;

        assert_eq!(responses, vec![DaemonResponse::failure("no routes to purge")]);
        assert!(router.calls().is_empty());
        assert_eq!(fs::metadata(&fx.path).unwrap().modified().unwrap(), before);
    }

    #[tokio::test]
    async fn test_purge_removes_everything() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW)
            .with_dns("a.com", &["1.1.1.1", "2.2.2.2"])
            .with_dns("b.com", &["3.3.3.3"]);
        fx.run("add a.com b.com", &router).await;
        router.fail_routes_for("2.2.2.2");

        let responses = fx.run("purge", &router).await;

        assert_eq!(responses.len(), 1);
        assert!(responses[0].success);
        assert_eq!(responses[0].response, "purged all routes");
        assert!(fx.entries().await.is_empty());
        assert!(EntryStore::open(&fx.path).await.unwrap().is_empty());
        let removals = router
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RouteCall::Remove(_)))
            .count();
        assert_eq!(removals, 3);
    }

    #[tokio::test]
    async fn test_reload_failure_answers_every_domain() {
        let fx = Fixture::new().await;
        fs::write(&fx.path, "garbage").unwrap();
        let router = MockRouter::new(GW)
            .with_dns("a.com", &["1.1.1.1"])
            .with_dns("b.com", &["2.2.2.2"]);

        let responses = fx.run("add a.com b.com", &router).await;

        assert_eq!(responses.len(), 2);
        for response in &responses {
            assert!(!response.success);
            assert!(response.error.starts_with("failed to reload state"));
        }
        assert_eq!(fx.run("remove a.com b.com c.com", &router).await.len(), 3);
        assert!(router.calls().is_empty());
    }

    #[tokio::test]
    async fn test_command_sees_state_written_by_another_process() {
        let fx = Fixture::new().await;
        fs::write(
            &fx.path,
            r#"{"entries":[{"domain":"a.com","gateway":"10.0.0.1","resolvedIPs":["1.1.1.1"]}]}"#,
        )
        .unwrap();
        let router = MockRouter::new(GW);

        let responses = fx.run("remove a.com", &router).await;

        assert_eq!(responses, vec![DaemonResponse::success("removed route for a.com")]);
        assert_eq!(router.calls(), vec![RouteCall::Remove("1.1.1.1".parse().unwrap())]);
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let fx = Fixture::new().await;
        let router = MockRouter::new(GW);

        assert!(fx.run("", &router).await.is_empty());
        assert_eq!(
            fx.run("flush", &router).await,
            vec![DaemonResponse::failure("unknown command: flush")]
        );
        assert_eq!(
            fx.run("add", &router).await,
            vec![DaemonResponse::failure("missing domain argument for add")]
        );
        assert!(router.lookups().is_empty());
    }
}
