//! Host registry
//!
//! The set of hosts the fleet knows about, in configuration order. Other
//! components look descriptors up here rather than holding copies, so an
//! upsert is visible to the next reconnect.

use std::sync::{PoisonError, RwLock};

use fleetdeck_api::models::HostDescriptor;
use tracing::warn;

/// Ordered, concurrently readable list of hosts
#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: RwLock<Vec<HostDescriptor>>,
}

impl HostRegistry {
    /// Create a registry, dropping later duplicates of an id
    #[must_use]
    pub fn new(hosts: Vec<HostDescriptor>) -> Self {
        let mut unique: Vec<HostDescriptor> = Vec::with_capacity(hosts.len());
        for host in hosts {
            if unique.iter().any(|h| h.id == host.id) {
                warn!(host = %host.id, "duplicate host id ignored");
                continue;
            }
            unique.push(host);
        }
        Self {
            hosts: RwLock::new(unique),
        }
    }

    /// All hosts in registry order
    #[must_use]
    pub fn snapshot(&self) -> Vec<HostDescriptor> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<HostDescriptor> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|h| h.id == id)
            .cloned()
    }

    /// Insert or replace a host, returning true when an entry was replaced
    pub fn upsert(&self, host: HostDescriptor) -> bool {
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = hosts.iter_mut().find(|h| h.id == host.id) {
            *existing = host;
            true
        } else {
            hosts.push(host);
            false
        }
    }

    pub fn remove(&self, id: &str) -> Option<HostDescriptor> {
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        let index = hosts.iter().position(|h| h.id == id)?;
        Some(hosts.remove(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse the compact `id:name:address:flag` host list
///
/// Entries are separated by `|`. The address may itself contain colons, so
/// the flag is taken from the end and id and name from the front. The flag
/// marks a local host when it is `local` or `true`. Malformed entries are
/// skipped; if nothing usable remains the local default host is returned.
#[must_use]
pub fn parse_hosts_spec(spec: &str) -> Vec<HostDescriptor> {
    let mut hosts: Vec<HostDescriptor> = Vec::new();

    for entry in spec.split('|').map(str::trim).filter(|e| !e.is_empty()) {
        match parse_entry(entry) {
            Some(host) if hosts.iter().any(|h| h.id == host.id) => {
                warn!(host = %host.id, "duplicate host id in host list");
            }
            Some(host) => hosts.push(host),
            None => warn!(entry = %entry, "skipping malformed host entry"),
        }
    }

    if hosts.is_empty() {
        hosts.push(HostDescriptor::local_default());
    }
    hosts
}

fn parse_entry(entry: &str) -> Option<HostDescriptor> {
    let (id, rest) = entry.split_once(':')?;
    let (name, rest) = rest.split_once(':')?;
    let (address, flag) = rest.rsplit_once(':')?;

    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    let flag = flag.trim();
    let is_local = flag.eq_ignore_ascii_case("local") || flag.eq_ignore_ascii_case("true");

    Some(HostDescriptor::new(id, name.trim(), address.trim(), is_local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hosts_spec() {
        let hosts = parse_hosts_spec(
            "local:Local:unix:///var/run/docker.sock:local|nas:NAS:tcp://10.0.0.5:2375:remote",
        );
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].address, "unix:///var/run/docker.sock");
        assert!(hosts[0].is_local);
        assert_eq!(hosts[1].id, "nas");
        assert_eq!(hosts[1].address, "tcp://10.0.0.5:2375");
        assert!(!hosts[1].is_local);
    }

    #[test]
    fn test_parse_hosts_spec_flags() {
        let hosts = parse_hosts_spec("a:A:tcp://a:2375:TRUE|b:B:tcp://b:2375:false");
        assert!(hosts[0].is_local);
        assert!(!hosts[1].is_local);
    }

    #[test]
    fn test_parse_hosts_spec_falls_back_to_local() {
        let hosts = parse_hosts_spec("garbage|:no-id:tcp://x:1:remote");
        assert_eq!(hosts, vec![HostDescriptor::local_default()]);
        assert_eq!(parse_hosts_spec(""), vec![HostDescriptor::local_default()]);
    }

    #[test]
    fn test_registry_upsert_and_remove() {
        let registry = HostRegistry::new(vec![
            HostDescriptor::new("a", "A", "tcp://a:2375", false),
            HostDescriptor::new("a", "dup", "tcp://dup:2375", false),
        ]);
        assert_eq!(registry.len(), 1);

        assert!(!registry.upsert(HostDescriptor::new("b", "B", "tcp://b:2375", false)));
        assert!(registry.upsert(HostDescriptor::new("a", "A2", "tcp://a2:2375", false)));
        assert_eq!(registry.get("a").map(|h| h.name), Some("A2".to_string()));

        let ids: Vec<String> = registry.snapshot().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.len(), 1);
    }
}
