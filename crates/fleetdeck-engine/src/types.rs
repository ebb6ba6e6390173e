//! Engine-neutral views of engine responses

use std::collections::HashMap;

use bollard::models::{ContainerConfig, HostConfig, RestartPolicy, RestartPolicyNameEnum};
use chrono::{DateTime, Utc};
use fleetdeck_api::models::{ContainerState, PortMapping};

/// Host-level engine facts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineInfo {
    /// Physical memory in bytes (0 when unknown)
    pub mem_total: u64,
    /// Logical CPU count (0 when unknown)
    pub ncpu: u64,
}

/// One row of a container listing
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerListing {
    /// Full container id
    pub id: String,
    /// Primary name without the leading `/`
    pub name: String,
    pub image: String,
    pub status: String,
    pub state: String,
    pub created: i64,
    pub ports: Vec<PortMapping>,
    pub labels: HashMap<String, String>,
    /// Network name to IP address
    pub networks: HashMap<String, String>,
    pub mounts: usize,
}

/// Configuration needed to recreate a container
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerSpec {
    pub config: ContainerConfig,
    pub host_config: HostConfig,
}

impl ContainerSpec {
    /// Image reference the container was created from
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.config.image.as_deref()
    }

    /// Copy suitable for a throwaway validation run
    ///
    /// Port publications are removed so the copy never collides with the
    /// running original, and the restart policy is disabled so a crashing
    /// copy stays down.
    #[must_use]
    pub fn for_validation(&self) -> Self {
        let mut config = self.config.clone();
        config.exposed_ports = None;
        config.hostname = None;

        let mut host_config = self.host_config.clone();
        host_config.port_bindings = None;
        host_config.publish_all_ports = Some(false);
        host_config.restart_policy = Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            maximum_retry_count: None,
        });

        Self {
            config,
            host_config,
        }
    }

    /// Whether any port is published to the host
    #[must_use]
    pub fn publishes_ports(&self) -> bool {
        self.host_config
            .port_bindings
            .as_ref()
            .is_some_and(|b| !b.is_empty())
            || self.host_config.publish_all_ports == Some(true)
    }
}

/// Result of inspecting one container
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerDetails {
    pub id: String,
    /// Name without the leading `/`
    pub name: String,
    pub state: Option<ContainerState>,
    pub running: bool,
    pub exit_code: i64,
    /// Health check status (`starting`, `healthy`, `unhealthy`), if one is defined
    pub health: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub labels: HashMap<String, String>,
    pub spec: ContainerSpec,
}

impl ContainerDetails {
    /// Image reference, falling back to an empty string
    #[must_use]
    pub fn image(&self) -> &str {
        self.spec.image().unwrap_or_default()
    }
}

/// Local image metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageDetails {
    pub id: String,
    pub repo_digests: Vec<String>,
}

/// Per-interface network counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One block I/O accounting entry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlkioEntry {
    pub op: String,
    pub value: u64,
}

/// A single raw stats sample with its previous-sample CPU counters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawStatsSample {
    pub cpu_total: u64,
    pub precpu_total: u64,
    pub system_cpu: Option<u64>,
    pub presystem_cpu: Option<u64>,
    pub online_cpus: Option<u64>,
    /// Length of the per-CPU usage array
    pub percpu_count: usize,
    pub memory_usage: Option<u64>,
    pub memory_limit: Option<u64>,
    pub networks: Vec<NetworkCounters>,
    pub blkio: Vec<BlkioEntry>,
}
