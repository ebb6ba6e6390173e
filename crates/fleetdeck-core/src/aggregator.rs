//! Fleet-wide fan-out and merge
//!
//! Every query spawns one worker per host, each bounded by its own deadline.
//! A slow or dead host costs its own deadline and nothing more: its result is
//! omitted (or reported offline) while the other hosts' results are merged.

use std::sync::Arc;
use std::time::Duration;

use fleetdeck_api::models::{
    ContainerSnapshot, ContainerState, ContainerStatsSnapshot, HostDescriptor, HostStatsSnapshot,
    SERVICE_LABEL, STACK_LABEL,
};
use fleetdeck_engine::{ContainerEngine, ContainerListing, EngineError};
use fleetdeck_exec::derive_ssh_host;
use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::config::AggregatorTimeouts;
use crate::disk::DiskUsage;
use crate::error::CoreError;
use crate::health::HealthTracker;
use crate::lifecycle::LifecycleTracker;
use crate::notify::Notifier;
use crate::pool::ConnectionPool;
use crate::registry::HostRegistry;
use crate::stats::container_stats_snapshot;

/// Length of the container ids published to clients
pub const SHORT_ID_LEN: usize = 12;

/// Merges per-host engine data into fleet views
///
/// Cheap to clone; all state lives behind shared handles.
#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<HostRegistry>,
    pool: Arc<ConnectionPool>,
    health: Arc<HealthTracker>,
    disk: Arc<DiskUsage>,
    lifecycle: Arc<LifecycleTracker>,
    notifier: Arc<dyn Notifier>,
    timeouts: AggregatorTimeouts,
}

impl Aggregator {
    #[must_use]
    pub fn new(
        registry: Arc<HostRegistry>,
        pool: Arc<ConnectionPool>,
        health: Arc<HealthTracker>,
        disk: Arc<DiskUsage>,
        lifecycle: Arc<LifecycleTracker>,
        notifier: Arc<dyn Notifier>,
        timeouts: AggregatorTimeouts,
    ) -> Self {
        Self {
            registry,
            pool,
            health,
            disk,
            lifecycle,
            notifier,
            timeouts,
        }
    }

    /// Containers from every reachable host, sorted by name
    ///
    /// Hosts in backoff or without a client are skipped. A host whose listing
    /// fails or exceeds `deadline` is marked failed and contributes nothing.
    #[instrument(skip(self))]
    pub async fn list_all_containers(&self, deadline: Duration) -> Vec<ContainerSnapshot> {
        let mut workers = JoinSet::new();

        for host in self.registry.snapshot() {
            if !self.health.is_healthy(&host.id) {
                debug!(host = %host.id, "skipping host in backoff");
                continue;
            }
            let engine = match self.pool.get(&host.id) {
                Ok(engine) => engine,
                Err(e) => {
                    debug!(host = %host.id, error = %e, "skipping unconnected host");
                    continue;
                }
            };

            let this = self.clone();
            workers.spawn(async move {
                match timeout(deadline, list_host(&host, engine.as_ref())).await {
                    Ok(Ok(containers)) => {
                        this.health.mark_healthy(&host.id);
                        this.track_lifecycle(&host.id, &containers);
                        containers
                    }
                    Ok(Err(e)) => {
                        warn!(host = %host.id, error = %e, "container listing failed");
                        this.health.mark_failed(&host.id);
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(host = %host.id, ?deadline, "container listing timed out");
                        this.health.mark_failed(&host.id);
                        Vec::new()
                    }
                }
            });
        }

        let mut all = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(mut containers) => all.append(&mut containers),
                Err(e) => warn!(error = %e, "listing worker aborted"),
            }
        }

        sort_by_name(&mut all);
        all
    }

    /// Containers of a single host, bypassing backoff
    ///
    /// # Errors
    /// Returns an error if the host has no client or the listing fails
    pub async fn list_host_containers(
        &self,
        host_id: &str,
        deadline: Duration,
    ) -> Result<Vec<ContainerSnapshot>, CoreError> {
        let host = self
            .registry
            .get(host_id)
            .ok_or_else(|| CoreError::HostNotFound(host_id.to_string()))?;
        let engine = self.pool.get(host_id)?;
        let mut containers = timeout(deadline, list_host(&host, engine.as_ref()))
            .await
            .map_err(|_| CoreError::Timeout)??;
        sort_by_name(&mut containers);
        Ok(containers)
    }

    fn track_lifecycle(&self, host_id: &str, containers: &[ContainerSnapshot]) {
        for t in self.lifecycle.observe(host_id, containers) {
            debug!(host = %t.host_id, container = %t.container_id, change = %t.change, "lifecycle transition");
            self.notifier.notify_state_change(&t.name, t.change);
        }
    }

    /// One stats sample per running container
    ///
    /// Samples that fail or time out are omitted.
    #[instrument(skip(self, containers), fields(count = containers.len()))]
    pub async fn stats_for_containers(
        &self,
        containers: &[ContainerSnapshot],
    ) -> Vec<ContainerStatsSnapshot> {
        let sample_timeout = self.timeouts.container_sample;
        let mut workers = JoinSet::new();

        for c in containers.iter().filter(|c| c.state.is_running()) {
            let Ok(engine) = self.pool.get(&c.host_id) else {
                continue;
            };
            let (host_id, id, name) = (c.host_id.clone(), c.id.clone(), c.name.clone());
            workers.spawn(async move {
                match timeout(sample_timeout, engine.stats(&id)).await {
                    Ok(Ok(sample)) => Some(container_stats_snapshot(&host_id, &id, &name, &sample, 0)),
                    Ok(Err(e)) => {
                        debug!(host = %host_id, container = %id, error = %e, "stats sample failed");
                        None
                    }
                    Err(_) => {
                        debug!(host = %host_id, container = %id, "stats sample timed out");
                        None
                    }
                }
            });
        }

        let mut all = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Ok(Some(stats)) = joined {
                self.notifier
                    .notify_high_resource(&stats.name, stats.cpu_percent, stats.memory_percent);
                all.push(stats);
            }
        }
        all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        all
    }

    /// Stats for one container
    ///
    /// # Errors
    /// Returns an error if the host has no client or the sample fails
    pub async fn container_stats(
        &self,
        host_id: &str,
        container_id: &str,
    ) -> Result<ContainerStatsSnapshot, CoreError> {
        let engine = self.pool.get(host_id)?;
        let (details, sample) = tokio::join!(
            engine.inspect_container(container_id),
            timeout(self.timeouts.container_sample, engine.stats(container_id))
        );
        let sample = sample.map_err(|_| CoreError::Timeout)??;
        let name = details.map_or_else(|_| container_id.to_string(), |d| d.name);
        Ok(container_stats_snapshot(
            host_id,
            container_id,
            &name,
            &sample,
            0,
        ))
    }

    /// Per-host summaries in registry order
    ///
    /// Every registered host appears exactly once. Hosts that cannot be
    /// queried within `deadline` are reported offline with zeroed figures.
    #[instrument(skip(self))]
    pub async fn host_stats(&self, deadline: Duration) -> Vec<HostStatsSnapshot> {
        let hosts = self.registry.snapshot();
        let mut workers = JoinSet::new();

        for (index, host) in hosts.iter().cloned().enumerate() {
            let this = self.clone();
            workers.spawn(async move {
                let snapshot = match timeout(deadline, this.collect_host_stats(&host)).await {
                    Ok(snapshot) => snapshot,
                    Err(_) => {
                        warn!(host = %host.id, ?deadline, "host stats timed out");
                        offline(&host)
                    }
                };
                (index, snapshot)
            });
        }

        let mut slots: Vec<Option<HostStatsSnapshot>> = vec![None; hosts.len()];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, snapshot)) => slots[index] = Some(snapshot),
                Err(e) => warn!(error = %e, "host stats worker aborted"),
            }
        }

        slots
            .into_iter()
            .zip(&hosts)
            .map(|(slot, host)| slot.unwrap_or_else(|| offline(host)))
            .collect()
    }

    async fn collect_host_stats(&self, host: &HostDescriptor) -> HostStatsSnapshot {
        let mut snapshot = offline(host);

        if !self.health.is_healthy(&host.id) {
            return snapshot;
        }
        let Ok(engine) = self.pool.get(&host.id) else {
            return snapshot;
        };

        match timeout(self.timeouts.ping, engine.ping()).await {
            Ok(Ok(())) => self.health.mark_healthy(&host.id),
            Ok(Err(e)) => {
                warn!(host = %host.id, error = %e, "engine ping failed");
                self.health.mark_failed(&host.id);
                return snapshot;
            }
            Err(_) => {
                warn!(host = %host.id, "engine ping timed out");
                self.health.mark_failed(&host.id);
                return snapshot;
            }
        }
        snapshot.online = true;

        let info = engine.info().await.unwrap_or_else(|e| {
            debug!(host = %host.id, error = %e, "engine info unavailable");
            Default::default()
        });

        let (disks, usage) = tokio::join!(
            self.disk.volumes(host),
            self.sample_host_usage(host, engine.as_ref(), info.ncpu)
        );
        snapshot.disks = disks;

        let usage = match usage {
            Ok(usage) => usage,
            Err(e) => {
                warn!(host = %host.id, error = %e, "host container listing failed");
                return snapshot;
            }
        };

        snapshot.container_count = usage.container_count;
        snapshot.running_count = usage.running_count;
        snapshot.cpu_percent = if info.ncpu > 0 {
            #[allow(clippy::cast_precision_loss)]
            let cores = info.ncpu as f64;
            usage.cpu_sum / cores
        } else {
            usage.cpu_sum
        };
        snapshot.memory_used = usage.memory_used;
        snapshot.memory_total = if info.mem_total > 0 {
            info.mem_total
        } else {
            usage.largest_limit
        };
        snapshot.memory_percent =
            crate::stats::memory_percent(snapshot.memory_used, snapshot.memory_total);
        snapshot
    }

    async fn sample_host_usage(
        &self,
        host: &HostDescriptor,
        engine: &dyn ContainerEngine,
        ncpu: u64,
    ) -> Result<HostUsage, EngineError> {
        let listing = engine.list_containers(true).await?;
        let running: Vec<&ContainerListing> = listing
            .iter()
            .filter(|c| ContainerState::from_engine(&c.state).is_running())
            .collect();

        let sample_timeout = self.timeouts.host_sample;
        let sample_futures: Vec<_> = running
            .iter()
            .map(|c| async move { timeout(sample_timeout, engine.stats(&c.id)).await })
            .collect();
        let samples: Vec<_> = stream::iter(sample_futures)
        .buffer_unordered(self.timeouts.sample_concurrency)
        .collect()
        .await;

        let mut usage = HostUsage {
            container_count: listing.len(),
            running_count: running.len(),
            ..HostUsage::default()
        };
        for sample in samples {
            match sample {
                Ok(Ok(sample)) => {
                    let stats = container_stats_snapshot(&host.id, "", "", &sample, ncpu);
                    usage.cpu_sum += stats.cpu_percent;
                    usage.memory_used = usage.memory_used.saturating_add(stats.memory_usage);
                    usage.largest_limit = usage.largest_limit.max(stats.memory_limit);
                }
                Ok(Err(e)) => debug!(host = %host.id, error = %e, "container sample failed"),
                Err(_) => debug!(host = %host.id, "container sample timed out"),
            }
        }
        Ok(usage)
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct HostUsage {
    container_count: usize,
    running_count: usize,
    cpu_sum: f64,
    memory_used: u64,
    largest_limit: u64,
}

fn offline(host: &HostDescriptor) -> HostStatsSnapshot {
    HostStatsSnapshot::offline(host, derive_ssh_host(host))
}

fn sort_by_name(containers: &mut [ContainerSnapshot]) {
    containers.sort_by_cached_key(|c| c.name.to_lowercase());
}

/// List one host and inspect its running containers for health status
async fn list_host(
    host: &HostDescriptor,
    engine: &dyn ContainerEngine,
) -> Result<Vec<ContainerSnapshot>, EngineError> {
    let listing = engine.list_containers(true).await?;

    let health = join_all(listing.iter().map(|c| async move {
        if !ContainerState::from_engine(&c.state).is_running() {
            return None;
        }
        engine
            .inspect_container(&c.id)
            .await
            .ok()
            .and_then(|d| d.health)
    }))
    .await;

    Ok(listing
        .into_iter()
        .zip(health)
        .map(|(c, health)| to_snapshot(host, c, health))
        .collect())
}

/// Convert an engine listing row into the published record
#[must_use]
pub fn to_snapshot(
    host: &HostDescriptor,
    listing: ContainerListing,
    health: Option<String>,
) -> ContainerSnapshot {
    let stack = listing.labels.get(STACK_LABEL).cloned();
    let service = listing.labels.get(SERVICE_LABEL).cloned();
    ContainerSnapshot {
        id: listing.id.chars().take(SHORT_ID_LEN).collect(),
        name: listing.name,
        image: listing.image,
        status: listing.status,
        state: ContainerState::from_engine(&listing.state),
        created: listing.created,
        host_id: host.id.clone(),
        host_name: host.name.clone(),
        ports: listing.ports,
        labels: listing.labels,
        health,
        networks: listing.networks,
        volumes: listing.mounts,
        stack,
        service,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_snapshot_conversion() {
        let host = HostDescriptor::new("nas", "NAS", "tcp://nas:2375", false);
        let mut labels = HashMap::new();
        labels.insert(STACK_LABEL.to_string(), "media".to_string());
        labels.insert(SERVICE_LABEL.to_string(), "jellyfin".to_string());
        let listing = ContainerListing {
            id: "0123456789abcdef0123".into(),
            name: "jellyfin".into(),
            image: "jellyfin/jellyfin:latest".into(),
            state: "running".into(),
            labels,
            mounts: 2,
            ..Default::default()
        };

        let snapshot = to_snapshot(&host, listing, Some("healthy".into()));
        assert_eq!(snapshot.id, "0123456789ab");
        assert_eq!(snapshot.host_name, "NAS");
        assert_eq!(snapshot.state, ContainerState::Running);
        assert_eq!(snapshot.stack.as_deref(), Some("media"));
        assert_eq!(snapshot.service.as_deref(), Some("jellyfin"));
        assert_eq!(snapshot.volumes, 2);
    }

    #[test]
    fn test_sort_is_case_insensitive() {
        let host = HostDescriptor::new("nas", "NAS", "tcp://nas:2375", false);
        let mut containers: Vec<ContainerSnapshot> = ["beta", "Alpha", "gamma", "Delta"]
            .iter()
            .map(|name| {
                to_snapshot(
                    &host,
                    ContainerListing {
                        name: (*name).to_string(),
                        ..Default::default()
                    },
                    None,
                )
            })
            .collect();
        sort_by_name(&mut containers);
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "Delta", "gamma"]);
    }
}
