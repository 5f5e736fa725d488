use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::models::{dedup_ips, ip_diff, RouteEntry, StateDocument};
use crate::route::RouteAdapter;
use crate::{Error, Result};

/// The store shared by connection handlers and the reconciler.
///
/// Every mutation happens while holding this lock. DNS lookups, route
/// commands and socket writes happen outside it.
pub type SharedStore = Arc<Mutex<EntryStore>>;

/// Outcome of a successful [`EntryStore::add_entry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    /// The domain existed with another IP set; `previous` is the replaced entry
    Updated { previous: RouteEntry },
}

/// Counts from one [`check_ip_changes`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub changed: usize,
    pub failed: usize,
}

/// Kernel route work for one drifted entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub domain: String,
    pub gateway: Ipv4Addr,
    pub dropped: Vec<Ipv4Addr>,
    pub added: Vec<Ipv4Addr>,
}

#[derive(Serialize)]
struct StateDocumentRef<'a> {
    entries: &'a [RouteEntry],
}

/// Route entries bound to a JSON state file, written through on every change
#[derive(Debug)]
pub struct EntryStore {
    entries: Vec<RouteEntry>,
    path: PathBuf,
}

impl EntryStore {
    /// Create an empty store bound to `path` without touching the disk
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            path: path.into(),
        }
    }

    /// Create a store bound to `path` and load it (creating the file if absent)
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);
        store.reload().await?;
        Ok(store)
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-read the backing file. A missing file is created with no entries.
    ///
    /// Later entries repeating a domain are dropped.
    pub async fn reload(&mut self) -> Result<()> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "state file not found, creating empty state");
                self.entries.clear();
                return self.write().await;
            }
            Err(e) => return Err(e.into()),
        };

        let document: StateDocument = serde_json::from_slice(&content)?;
        let mut seen = HashSet::new();
        self.entries = document
            .entries
            .into_iter()
            .filter(|entry| {
                let first = seen.insert(entry.domain.clone());
                if !first {
                    warn!(domain = %entry.domain, "dropping duplicate entry from state file");
                }
                first
            })
            .map(|entry| RouteEntry::new(entry.domain, entry.gateway, entry.resolved_ips))
            .collect();

        Ok(())
    }

    /// Persist all entries: write `<path>.tmp`, sync, rename over `<path>`.
    ///
    /// The file work runs on the blocking pool.
    pub async fn write(&self) -> Result<()> {
        let data = serde_json::to_vec(&StateDocumentRef {
            entries: &self.entries,
        })?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || persist(&path, &data))
            .await
            .map_err(|e| Error::Other(format!("state write task failed: {}", e)))??;

        debug!(path = %self.path.display(), entries = self.entries.len(), "state written");
        Ok(())
    }

    /// Insert or update by domain.
    ///
    /// An update replaces the whole entry, gateway included. The in-memory
    /// change is kept even when persisting fails.
    pub async fn add_entry(&mut self, entry: RouteEntry) -> Result<Upsert> {
        let upsert = match self.entries.iter().position(|e| e.domain == entry.domain) {
            Some(index) => {
                let existing = &mut self.entries[index];
                if existing.has_ip_set(&entry.resolved_ips) {
                    return Err(Error::EntryAlreadyExists(entry.domain));
                }
                let fresh = RouteEntry::new(entry.domain, entry.gateway, entry.resolved_ips);
                let previous = std::mem::replace(existing, fresh);
                Upsert::Updated { previous }
            }
            None => {
                self.entries.push(entry);
                Upsert::Inserted
            }
        };

        self.write().await?;
        Ok(upsert)
    }

    /// Remove the entry for `domain` and return it.
    pub async fn remove_entry(&mut self, domain: &str) -> Result<RouteEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.domain == domain)
            .ok_or_else(|| Error::EntryNotFound(domain.to_string()))?;

        let removed = self.entries.remove(index);
        self.write().await?;
        Ok(removed)
    }

    pub fn get_entry(&self, domain: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.domain == domain)
    }

    /// Drop every entry and persist.
    pub async fn purge(&mut self) -> Result<()> {
        self.entries.clear();
        self.write().await
    }

    /// JSON array of all entries, as returned by `list`
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    pub fn domains(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.domain.clone()).collect()
    }

    /// Replace the IP set of every entry whose fresh resolution differs.
    ///
    /// Domains no longer in the store are ignored. Nothing is persisted.
    pub fn apply_resolutions(&mut self, resolved: &[(String, Vec<Ipv4Addr>)]) -> Vec<RouteChange> {
        let mut changes = Vec::new();

        for (domain, fresh) in resolved {
            let Some(entry) = self.entries.iter_mut().find(|e| &e.domain == domain) else {
                debug!(%domain, "entry removed during ip check, skipping");
                continue;
            };
            if entry.has_ip_set(fresh) {
                continue;
            }

            let (dropped, added) = ip_diff(&entry.resolved_ips, fresh);
            entry.resolved_ips = dedup_ips(fresh.iter().copied());
            changes.push(RouteChange {
                domain: domain.clone(),
                gateway: entry.gateway,
                dropped,
                added,
            });
        }

        changes
    }
}

/// Re-resolve every stored domain and repair kernel routes whose IP set drifted.
///
/// Lookups and route commands run without the lock; the store is locked once
/// to apply the fresh sets and write the file (only if an entry changed).
/// Route changes are applied even when that write fails.
pub async fn check_ip_changes(store: &SharedStore, router: &dyn RouteAdapter) -> Result<ReconcileReport> {
    let domains = store.lock().await.domains();

    let mut report = ReconcileReport {
        checked: domains.len(),
        ..ReconcileReport::default()
    };
    if domains.is_empty() {
        info!("no entries found in the state, skipping ip check");
        return Ok(report);
    }

    let mut resolved = Vec::with_capacity(domains.len());
    for domain in domains {
        match router.resolve_domain(&domain).await {
            Ok(ips) => resolved.push((domain, dedup_ips(ips))),
            Err(e) => {
                error!(%domain, error = %e, "failed to resolve domain");
                report.failed += 1;
            }
        }
    }

    let (changes, written) = {
        let mut store = store.lock().await;
        let changes = store.apply_resolutions(&resolved);
        let written = if changes.is_empty() {
            debug!("no change, skipping state update");
            Ok(())
        } else {
            info!(changed = changes.len(), "ip changes detected, applying internal state");
            store.write().await
        };
        (changes, written)
    };
    report.changed = changes.len();

    for change in &changes {
        info!(domain = %change.domain, "ip changes detected, applying changes to the routing table");
        for ip in &change.dropped {
            if let Err(e) = router.remove_route(*ip).await {
                warn!(domain = %change.domain, %ip, error = %e, "failed to remove stale route");
            }
        }
        for ip in &change.added {
            if let Err(e) = router.add_route(*ip, change.gateway).await {
                warn!(domain = %change.domain, %ip, error = %e, "failed to add route");
            }
        }
    }

    written?;
    Ok(report)
}

fn persist(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = tmp_path(path);
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
