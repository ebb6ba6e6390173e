//! Container engine traits

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_api::models::{ContainerAction, HostDescriptor};
use fleetdeck_exec::terminal::{PtySize, TerminalBridge};
use futures::stream::BoxStream;

use crate::error::EngineError;
use crate::types::{
    ContainerDetails, ContainerListing, ContainerSpec, EngineInfo, ImageDetails, RawStatsSample,
};

/// Stop/restart grace period used by lifecycle actions
pub const ACTION_GRACE: Duration = Duration::from_secs(10);

/// API client for one host's container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Round-trip to the engine
    async fn ping(&self) -> Result<(), EngineError>;

    /// Host memory and CPU facts
    async fn info(&self) -> Result<EngineInfo, EngineError>;

    /// List containers, including stopped ones when `all` is set
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerListing>, EngineError>;

    /// Inspect one container
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError>;

    /// Take one stats sample
    async fn stats(&self, id: &str) -> Result<RawStatsSample, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), EngineError>;

    async fn restart_container(&self, id: &str, grace: Duration) -> Result<(), EngineError>;

    async fn pause_container(&self, id: &str) -> Result<(), EngineError>;

    async fn unpause_container(&self, id: &str) -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    /// Create a container and return its id
    async fn create_container(&self, name: &str, spec: &ContainerSpec)
    -> Result<String, EngineError>;

    /// Pull an image, draining the progress stream to completion
    async fn pull_image(&self, image: &str) -> Result<(), EngineError>;

    async fn inspect_image(&self, image: &str) -> Result<ImageDetails, EngineError>;

    /// Digest the registry currently serves for an image reference
    async fn registry_digest(&self, image: &str) -> Result<String, EngineError>;

    /// Last `tail` log lines with timestamps
    async fn logs(&self, id: &str, tail: u32) -> Result<Vec<String>, EngineError>;

    /// Follow log output, starting with the last `tail` lines
    async fn follow_logs(
        &self,
        id: &str,
        tail: u32,
    ) -> Result<BoxStream<'static, Result<String, EngineError>>, EngineError>;

    /// Start an interactive exec session with a TTY
    async fn exec_terminal(
        &self,
        id: &str,
        command: Vec<String>,
        size: PtySize,
    ) -> Result<TerminalBridge, EngineError>;

    /// Get engine type name (for logging)
    fn engine_type(&self) -> &'static str;

    /// Apply a lifecycle action through the API
    async fn apply_action(&self, id: &str, action: ContainerAction) -> Result<(), EngineError> {
        match action {
            ContainerAction::Start => self.start_container(id).await,
            ContainerAction::Stop => self.stop_container(id, ACTION_GRACE).await,
            ContainerAction::Restart => self.restart_container(id, ACTION_GRACE).await,
            ContainerAction::Pause => self.pause_container(id).await,
            ContainerAction::Unpause => self.unpause_container(id).await,
        }
    }
}

/// Creates engine clients for hosts
///
/// Allows injection of different engine clients per host.
pub trait EngineConnector: Send + Sync {
    /// Build a client for the host (no I/O is performed)
    ///
    /// # Errors
    /// Returns `EngineError::Config` if the address cannot be used
    fn connect(&self, host: &HostDescriptor) -> Result<Arc<dyn ContainerEngine>, EngineError>;
}
