//! `Fleet`: the facade the daemon talks to
//!
//! Wires the registry, pool, health tracker, aggregator, routing, update
//! engine, update checker and hub together and exposes fleet operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fleetdeck_api::events::WsEvent;
use fleetdeck_api::models::{
    ContainerAction, ContainerSnapshot, ContainerStatsSnapshot, HostDescriptor, HostFileEntry,
    HostStatsSnapshot, ImageUpdateRecord, StackSummary,
};
use fleetdeck_engine::{EngineConnector, EngineError};
use fleetdeck_exec::{PtySize, RemoteFiles, RemoteShell, TerminalBridge};
use futures::stream::BoxStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::actor::hub::{HubActorArgs, HubHandle, PushSubscriber};
use crate::aggregator::{Aggregator, SHORT_ID_LEN};
use crate::broadcaster::spawn_broadcaster;
use crate::config::FleetSettings;
use crate::disk::DiskUsage;
use crate::error::CoreError;
use crate::health::HealthTracker;
use crate::lifecycle::LifecycleTracker;
use crate::message::{SubscriberId, Subscription};
use crate::notify::Notifier;
use crate::pool::ConnectionPool;
use crate::registry::HostRegistry;
use crate::routing::{ContainerController, Route};
use crate::update::{UpdateEngine, UpdateError, UpdateOutcome};
use crate::update_check::UpdateChecker;

/// External collaborators a fleet is built from
pub struct FleetDeps {
    pub connector: Arc<dyn EngineConnector>,
    pub shell: Arc<dyn RemoteShell>,
    pub files: Arc<dyn RemoteFiles>,
    pub notifier: Arc<dyn Notifier>,
}

/// Handles of the background tasks started by `Fleet::spawn_background`
#[derive(Debug)]
pub struct BackgroundTasks {
    pub broadcaster: JoinHandle<()>,
    pub update_checker: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Abort both tasks
    pub fn abort(&self) {
        self.broadcaster.abort();
        self.update_checker.abort();
    }
}

/// The container fleet
#[derive(Clone)]
pub struct Fleet {
    registry: Arc<HostRegistry>,
    pool: Arc<ConnectionPool>,
    health: Arc<HealthTracker>,
    disk: Arc<DiskUsage>,
    lifecycle: Arc<LifecycleTracker>,
    aggregator: Aggregator,
    controller: Arc<ContainerController>,
    updater: UpdateEngine,
    checker: Arc<UpdateChecker>,
    files: Arc<dyn RemoteFiles>,
    hub: HubHandle,
    settings: Arc<FleetSettings>,
}

impl Fleet {
    /// Build a fleet and spawn its hub actor
    ///
    /// No host is contacted; call `connect_all` to create engine clients
    /// eagerly. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(hosts: Vec<HostDescriptor>, deps: FleetDeps, settings: FleetSettings) -> Self {
        let registry = Arc::new(HostRegistry::new(hosts));
        let pool = Arc::new(ConnectionPool::new(registry.clone(), deps.connector));
        let health = Arc::new(HealthTracker::new(settings.backoff()));
        let disk = Arc::new(DiskUsage::new(
            deps.shell.clone(),
            Duration::from_secs(settings.disk_ttl_secs),
            Duration::from_secs(settings.disk_timeout_secs),
        ));
        let lifecycle = Arc::new(LifecycleTracker::new(settings.eviction_passes));
        let aggregator = Aggregator::new(
            registry.clone(),
            pool.clone(),
            health.clone(),
            disk.clone(),
            lifecycle.clone(),
            deps.notifier,
            settings.aggregator_timeouts(),
        );
        let controller = Arc::new(ContainerController::new(
            registry.clone(),
            pool.clone(),
            deps.shell,
        ));
        let checker = Arc::new(UpdateChecker::new(
            pool.clone(),
            settings.update_ttl(),
            settings.update_concurrency,
        ));
        let hub = HubHandle::spawn(HubActorArgs {
            push_timeout: Duration::from_secs(settings.push_timeout_secs),
            push_queue: settings.push_queue,
        });

        info!(hosts = registry.len(), "fleet initialized");

        Self {
            registry,
            pool,
            health,
            disk,
            lifecycle,
            aggregator,
            controller,
            updater: UpdateEngine::new(settings.update_policy()),
            checker,
            files: deps.files,
            hub,
            settings: Arc::new(settings),
        }
    }

    /// Create engine clients for every host, returning how many succeeded
    pub fn connect_all(&self) -> usize {
        let connected = self.pool.connect_all();
        info!(connected, total = self.registry.len(), "engine clients created");
        connected
    }

    /// Start the broadcaster and the periodic image update check
    #[must_use]
    pub fn spawn_background(&self) -> BackgroundTasks {
        BackgroundTasks {
            broadcaster: spawn_broadcaster(
                self.aggregator.clone(),
                self.hub.clone(),
                self.settings.broadcaster(),
            ),
            update_checker: self.checker.clone().spawn_periodic(
                self.aggregator.clone(),
                self.settings.list_deadline(),
                self.settings.update_schedule(),
            ),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    #[must_use]
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    // ========================================================================
    // Hosts
    // ========================================================================

    #[must_use]
    pub fn hosts(&self) -> Vec<HostDescriptor> {
        self.registry.snapshot()
    }

    #[must_use]
    pub fn host(&self, host_id: &str) -> Option<HostDescriptor> {
        self.registry.get(host_id)
    }

    /// Add or replace a host
    ///
    /// Any cached client, backoff and disk reading for the id are discarded so
    /// the new descriptor takes effect on the next access. Returns true when
    /// an existing host was replaced.
    pub fn upsert_host(&self, host: HostDescriptor) -> bool {
        let id = host.id.clone();
        let replaced = self.registry.upsert(host);
        self.reset_host_state(&id);
        info!(host = %id, replaced, "host upserted");
        replaced
    }

    /// Remove a host and everything cached for it
    pub fn remove_host(&self, host_id: &str) -> Option<HostDescriptor> {
        let removed = self.registry.remove(host_id);
        if removed.is_some() {
            self.reset_host_state(host_id);
            self.lifecycle.forget_host(host_id);
            info!(host = %host_id, "host removed");
        }
        removed
    }

    fn reset_host_state(&self, host_id: &str) {
        self.pool.invalidate(host_id);
        self.health.forget(host_id);
        self.disk.invalidate(host_id);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All containers across the fleet, sorted by name
    pub async fn list_containers(&self) -> Vec<ContainerSnapshot> {
        self.aggregator
            .list_all_containers(self.settings.list_deadline())
            .await
    }

    /// Containers matching a free-text query
    pub async fn search(&self, query: &str) -> Vec<ContainerSnapshot> {
        let query = query.trim();
        let mut containers = self.list_containers().await;
        if !query.is_empty() {
            containers.retain(|c| c.matches(query));
        }
        containers
    }

    /// Containers grouped by compose project, optionally for one host
    pub async fn stacks(&self, host_id: Option<&str>) -> Vec<StackSummary> {
        let containers = self.list_containers().await;
        group_stacks(containers, host_id)
    }

    /// Per-host summaries in registry order
    pub async fn host_stats(&self) -> Vec<HostStatsSnapshot> {
        self.aggregator
            .host_stats(self.settings.list_deadline())
            .await
    }

    /// Stats for every running container
    pub async fn all_stats(&self) -> Vec<ContainerStatsSnapshot> {
        let containers = self.list_containers().await;
        self.aggregator.stats_for_containers(&containers).await
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
        self.aggregator
            .container_stats(host_id, container_id)
            .await
    }

    /// Last `tail` log lines of a container
    ///
    /// # Errors
    /// Returns an error if the host has no client or the engine call fails
    pub async fn container_logs(
        &self,
        host_id: &str,
        container_id: &str,
        tail: u32,
    ) -> Result<Vec<String>, CoreError> {
        let engine = self.pool.get(host_id)?;
        Ok(engine.logs(container_id, tail).await?)
    }

    /// Follow a container's log output
    ///
    /// # Errors
    /// Returns an error if the host has no client or the stream cannot start
    pub async fn stream_logs(
        &self,
        host_id: &str,
        container_id: &str,
        tail: u32,
    ) -> Result<BoxStream<'static, Result<String, EngineError>>, CoreError> {
        let engine = self.pool.get(host_id)?;
        Ok(engine.follow_logs(container_id, tail).await?)
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Apply a lifecycle action, then refresh subscribers shortly after
    ///
    /// # Errors
    /// Returns an error if no route could perform the action
    #[instrument(skip(self), fields(host = %host_id, container = %container_id, action = %action))]
    pub async fn container_action(
        &self,
        host_id: &str,
        container_id: &str,
        action: ContainerAction,
    ) -> Result<Route, CoreError> {
        let route = self
            .controller
            .perform(host_id, container_id, action)
            .await?;
        self.schedule_refresh();
        Ok(route)
    }

    /// Update a container to the latest version of its image
    ///
    /// # Errors
    /// Returns `CoreError::Update` describing the failed stage; a run that
    /// outlives its deadline reports `UpdateError::DeadlineExceeded` with the
    /// stage it had reached
    #[instrument(skip(self), fields(host = %host_id, container = %container_id))]
    pub async fn update_container(
        &self,
        host_id: &str,
        container_id: &str,
    ) -> Result<UpdateOutcome, CoreError> {
        let engine = self
            .pool
            .get(host_id)
            .map_err(|_| UpdateError::NotConnected(host_id.to_string()))?;

        // the run lives on its own task so a caller going away cannot cut a swap short
        let outcome = self
            .updater
            .spawn(engine, container_id)
            .wait(self.settings.update_deadline())
            .await?;

        self.checker.invalidate(container_id);
        let short_new: String = outcome.new_id.chars().take(SHORT_ID_LEN).collect();
        self.checker.invalidate(&short_new);
        self.schedule_refresh();
        Ok(outcome)
    }

    /// Check every running container for image updates
    pub async fn check_updates(&self) -> Vec<ImageUpdateRecord> {
        let containers = self.list_containers().await;
        self.checker.check_all(&containers).await
    }

    /// Latest known update records without contacting any registry
    #[must_use]
    pub fn cached_updates(&self) -> Vec<ImageUpdateRecord> {
        self.checker.cached()
    }

    /// Check one container, serving a fresh cached result if there is one
    ///
    /// # Errors
    /// Returns `CoreError::ContainerNotFound` if the container is not listed
    /// on the host, or an error from the check itself
    pub async fn check_container_update(
        &self,
        host_id: &str,
        container_id: &str,
    ) -> Result<ImageUpdateRecord, CoreError> {
        let containers = self
            .aggregator
            .list_host_containers(host_id, self.settings.list_deadline())
            .await?;
        let container = containers
            .iter()
            .find(|c| container_id.starts_with(&c.id) || c.id.starts_with(container_id))
            .ok_or_else(|| CoreError::ContainerNotFound {
                host: host_id.to_string(),
                container: container_id.to_string(),
            })?;
        self.checker.check(container).await
    }

    // ========================================================================
    // Terminals and files
    // ========================================================================

    /// Open a shell inside a container
    ///
    /// # Errors
    /// Returns an error when no route could open the terminal
    pub async fn open_container_terminal(
        &self,
        host_id: &str,
        container_id: &str,
        size: PtySize,
    ) -> Result<(TerminalBridge, Route), CoreError> {
        self.controller
            .open_container_terminal(host_id, container_id, size)
            .await
    }

    /// Open a login shell on a host
    ///
    /// # Errors
    /// Returns an error when the remote shell cannot be opened
    pub async fn open_host_terminal(
        &self,
        host_id: &str,
        size: PtySize,
    ) -> Result<TerminalBridge, CoreError> {
        self.controller.open_host_terminal(host_id, size).await
    }

    fn require_host(&self, host_id: &str) -> Result<HostDescriptor, CoreError> {
        self.registry
            .get(host_id)
            .ok_or_else(|| CoreError::HostNotFound(host_id.to_string()))
    }

    /// List a directory on a host
    ///
    /// # Errors
    /// Returns an error for unknown hosts, relative paths or failed transfers
    pub async fn list_host_files(
        &self,
        host_id: &str,
        path: &str,
    ) -> Result<Vec<HostFileEntry>, CoreError> {
        let host = self.require_host(host_id)?;
        Ok(self.files.list_dir(&host, path).await?)
    }

    /// Read a file on a host
    ///
    /// # Errors
    /// Returns an error for unknown hosts, relative paths or failed transfers
    pub async fn read_host_file(&self, host_id: &str, path: &str) -> Result<Vec<u8>, CoreError> {
        let host = self.require_host(host_id)?;
        Ok(self.files.read_file(&host, path).await?)
    }

    /// Write a file on a host
    ///
    /// # Errors
    /// Returns an error for unknown hosts, relative paths or failed transfers
    pub async fn write_host_file(
        &self,
        host_id: &str,
        path: &str,
        data: &[u8],
    ) -> Result<(), CoreError> {
        let host = self.require_host(host_id)?;
        Ok(self.files.write_file(&host, path, data).await?)
    }

    /// Create a directory on a host
    ///
    /// # Errors
    /// Returns an error for unknown hosts, relative paths or failed transfers
    pub async fn make_host_dir(&self, host_id: &str, path: &str) -> Result<(), CoreError> {
        let host = self.require_host(host_id)?;
        Ok(self.files.make_dir(&host, path).await?)
    }

    /// Remove a file or empty directory on a host
    ///
    /// # Errors
    /// Returns an error for unknown hosts, relative paths or failed transfers
    pub async fn remove_host_path(&self, host_id: &str, path: &str) -> Result<(), CoreError> {
        let host = self.require_host(host_id)?;
        Ok(self.files.remove_path(&host, path).await?)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register a pull subscriber
    ///
    /// # Errors
    /// Returns an error if the hub is not running
    pub async fn subscribe(&self, capacity: usize) -> Result<Subscription, CoreError> {
        self.hub.subscribe(capacity).await
    }

    /// Register a push subscriber
    ///
    /// # Errors
    /// Returns an error if the hub is not running
    pub async fn subscribe_push(
        &self,
        subscriber: Box<dyn PushSubscriber>,
    ) -> Result<SubscriberId, CoreError> {
        self.hub.register_push(subscriber).await
    }

    /// Remove a subscriber
    ///
    /// # Errors
    /// Returns an error if the hub is not running
    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<bool, CoreError> {
        self.hub.unsubscribe(id).await
    }

    /// List containers now and broadcast the result
    ///
    /// # Errors
    /// Returns an error if the hub is not running
    pub async fn refresh_now(&self) -> Result<(), CoreError> {
        let containers = self.list_containers().await;
        let report = self.hub.publish(WsEvent::Containers(containers)).await?;
        debug!(delivered = report.delivered, "containers refreshed");
        Ok(())
    }

    fn schedule_refresh(&self) {
        let fleet = self.clone();
        let delay = self.settings.refresh_delay();
        tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = fleet.refresh_now().await {
                warn!(error = %e, "post-action refresh failed");
            }
        });
    }

    /// Stop the hub
    pub async fn shutdown(&self) {
        self.hub.stop().await;
    }
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("hosts", &self.registry.len())
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

/// Group containers by compose project
///
/// Containers without a project are left out. Stacks are ordered by host
/// then name.
#[must_use]
pub fn group_stacks(
    containers: Vec<ContainerSnapshot>,
    host_id: Option<&str>,
) -> Vec<StackSummary> {
    let mut groups: BTreeMap<(String, String), Vec<ContainerSnapshot>> = BTreeMap::new();
    for c in containers {
        if host_id.is_some_and(|h| h != c.host_id) {
            continue;
        }
        let Some(stack) = c.stack.clone() else {
            continue;
        };
        groups.entry((c.host_id.clone(), stack)).or_default().push(c);
    }

    groups
        .into_iter()
        .map(|((host_id, name), containers)| StackSummary {
            running_count: containers.iter().filter(|c| c.state.is_running()).count(),
            name,
            host_id,
            containers,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use fleetdeck_api::models::ContainerState;

    use super::*;

    fn container(
        host: &str,
        name: &str,
        stack: Option<&str>,
        state: ContainerState,
    ) -> ContainerSnapshot {
        ContainerSnapshot {
            id: format!("{name}-id"),
            name: name.to_string(),
            image: "img".into(),
            status: String::new(),
            state,
            created: 0,
            host_id: host.to_string(),
            host_name: host.to_uppercase(),
            ports: Vec::new(),
            labels: HashMap::new(),
            health: None,
            networks: HashMap::new(),
            volumes: 0,
            stack: stack.map(str::to_string),
            service: None,
        }
    }

    #[test]
    fn test_group_stacks() {
        let containers = vec![
            container("nas", "db", Some("media"), ContainerState::Running),
            container("nas", "web", Some("media"), ContainerState::Exited),
            container("pi", "dns", Some("net"), ContainerState::Running),
            container("nas", "loose", None, ContainerState::Running),
        ];

        let stacks = group_stacks(containers.clone(), None);
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0].name, "media");
        assert_eq!(stacks[0].containers.len(), 2);
        assert_eq!(stacks[0].running_count, 1);

        let stacks = group_stacks(containers, Some("pi"));
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].host_id, "pi");
    }
}
