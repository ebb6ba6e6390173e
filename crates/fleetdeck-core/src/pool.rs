//! Engine client pool

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use fleetdeck_engine::{ContainerEngine, EngineConnector};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::registry::HostRegistry;

/// One engine client per host, created on demand
pub struct ConnectionPool {
    registry: Arc<HostRegistry>,
    connector: Arc<dyn EngineConnector>,
    clients: RwLock<HashMap<String, Arc<dyn ContainerEngine>>>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(registry: Arc<HostRegistry>, connector: Arc<dyn EngineConnector>) -> Self {
        Self {
            registry,
            connector,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Create clients for every registered host
    ///
    /// Failures are logged and leave the host without a client; the next
    /// `get` retries. Returns the number of connected hosts.
    pub fn connect_all(&self) -> usize {
        let mut connected = 0;
        for host in self.registry.snapshot() {
            match self.connector.connect(&host) {
                Ok(client) => {
                    info!(host = %host.id, address = %host.address, "engine client ready");
                    self.clients
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(host.id.clone(), client);
                    connected += 1;
                }
                Err(e) => warn!(host = %host.id, error = %e, "failed to create engine client"),
            }
        }
        connected
    }

    /// Client for a host, connecting lazily
    ///
    /// # Errors
    /// Returns `CoreError::NotConnected` if the host is unknown or a client
    /// cannot be created
    pub fn get(&self, host_id: &str) -> Result<Arc<dyn ContainerEngine>, CoreError> {
        if let Some(client) = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host_id)
        {
            return Ok(client.clone());
        }

        let host = self
            .registry
            .get(host_id)
            .ok_or_else(|| CoreError::NotConnected(host_id.to_string()))?;

        let client = self.connector.connect(&host).map_err(|e| {
            debug!(host = %host_id, error = %e, "lazy connect failed");
            CoreError::NotConnected(host_id.to_string())
        })?;

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let client = clients.entry(host.id).or_insert(client).clone();
        Ok(client)
    }

    /// Drop the client so the next `get` reconnects with the current descriptor
    pub fn invalidate(&self, host_id: &str) -> bool {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host_id)
            .is_some()
    }

    /// Ids of hosts with a live client
    #[must_use]
    pub fn connected_hosts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connected", &self.connected_hosts())
            .finish_non_exhaustive()
    }
}
