//! Fleet data model shared by the daemon, the core and clients

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Compose project label used to group containers into stacks
pub const STACK_LABEL: &str = "com.docker.compose.project";

/// Compose service label
pub const SERVICE_LABEL: &str = "com.docker.compose.service";

/// A container engine host known to the registry
///
/// Descriptors are immutable; reconfiguration replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostDescriptor {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Engine address (`unix://`, `tcp://`, `http://` or bare host)
    pub address: String,
    /// Whether the engine runs on the same machine as the daemon
    #[serde(default)]
    pub is_local: bool,
}

impl HostDescriptor {
    /// Create a new host descriptor
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        is_local: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            is_local,
        }
    }

    /// The implicit host used when nothing else is configured
    #[must_use]
    pub fn local_default() -> Self {
        Self::new("local", "Local", "unix:///var/run/docker.sock", true)
    }
}

/// Lifecycle state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    /// Parse the engine's state string, mapping anything unexpected to `Unknown`
    #[must_use]
    pub fn from_engine(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A published or exposed container port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Port inside the container
    pub private: u16,
    /// Port on the host, if published
    pub public: Option<u16>,
    /// Protocol (`tcp`, `udp`, `sctp`)
    #[serde(rename = "type")]
    pub kind: String,
}

/// Point-in-time view of one container on one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSnapshot {
    /// Short (12 character) container id
    pub id: String,
    pub name: String,
    pub image: String,
    /// Human readable status line (`Up 3 hours`)
    pub status: String,
    pub state: ContainerState,
    /// Creation time, seconds since epoch
    pub created: i64,
    pub host_id: String,
    pub host_name: String,
    pub ports: Vec<PortMapping>,
    pub labels: HashMap<String, String>,
    /// Health check status for running containers that define one
    pub health: Option<String>,
    /// Network name to IP address
    pub networks: HashMap<String, String>,
    /// Number of mounts
    pub volumes: usize,
    /// Compose project, if any
    pub stack: Option<String>,
    /// Compose service, if any
    pub service: Option<String>,
}

impl ContainerSnapshot {
    /// Whether `query` matches the name, image or host name (case-insensitive)
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self.image.to_lowercase().contains(&query)
            || self.host_name.to_lowercase().contains(&query)
    }
}

/// Resource usage of one container derived from a single engine sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatsSnapshot {
    pub id: String,
    pub name: String,
    pub host_id: String,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
}

/// A mounted filesystem on a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiskVolumeInfo {
    pub mount_point: String,
    pub device: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

/// Aggregated view of one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostStatsSnapshot {
    pub id: String,
    pub name: String,
    pub container_count: usize,
    pub running_count: usize,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f64,
    pub online: bool,
    /// Remote shell target shown to operators
    pub ssh_host: String,
    pub disks: Vec<DiskVolumeInfo>,
}

impl HostStatsSnapshot {
    /// Record for a host that could not be queried this pass
    pub fn offline(host: &HostDescriptor, ssh_host: impl Into<String>) -> Self {
        Self {
            id: host.id.clone(),
            name: host.name.clone(),
            container_count: 0,
            running_count: 0,
            cpu_percent: 0.0,
            memory_used: 0,
            memory_total: 0,
            memory_percent: 0.0,
            online: false,
            ssh_host: ssh_host.into(),
            disks: Vec::new(),
        }
    }
}

/// Result of comparing a container's image digest with its registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpdateRecord {
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    pub host_id: String,
    pub current_digest: String,
    pub latest_digest: Option<String>,
    pub current_tag: String,
    pub latest_tag: Option<String>,
    pub has_update: bool,
    pub checked_at: DateTime<Utc>,
}

/// A file or directory on a host filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostFileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub mod_time: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

/// Containers sharing one compose project on one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackSummary {
    pub name: String,
    pub host_id: String,
    pub containers: Vec<ContainerSnapshot>,
    pub running_count: usize,
}

/// Lifecycle action accepted by the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
}

impl ContainerAction {
    /// The engine CLI verb for this action
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ContainerAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "pause" => Ok(Self::Pause),
            "unpause" => Ok(Self::Unpause),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!("pause".parse::<ContainerAction>(), Ok(ContainerAction::Pause));
        assert_eq!(
            "kill".parse::<ContainerAction>(),
            Err(UnknownAction("kill".to_string()))
        );
    }

    #[test]
    fn test_container_state_from_engine() {
        assert_eq!(ContainerState::from_engine("running"), ContainerState::Running);
        assert_eq!(ContainerState::from_engine("Exited"), ContainerState::Exited);
        assert_eq!(ContainerState::from_engine("zombie"), ContainerState::Unknown);
    }

    #[test]
    fn test_port_mapping_wire_shape() {
        let port = PortMapping {
            private: 80,
            public: Some(8080),
            kind: "tcp".to_string(),
        };
        let json = serde_json::to_value(&port).unwrap();
        assert_eq!(json["type"], "tcp");
        assert_eq!(json["public"], 8080);
    }
}
