//! Builds the fleet's external collaborators from configuration

use std::sync::Arc;

use fleetdeck_core::{FleetDeps, LogNotifier};
use fleetdeck_engine::DockerConnector;
use fleetdeck_exec::SshShell;
use tracing::info;

use crate::config::Config;

/// Engine client timeout handed to bollard, in seconds
const ENGINE_CLIENT_TIMEOUT_SECS: u64 = 30;

/// Create the engine connector, remote shell and notifier
///
/// One `SshShell` serves both commands and file transfer so the key is
/// loaded once.
#[must_use]
pub fn build_deps(config: &Config) -> FleetDeps {
    let key_source = config.ssh.key_source();
    info!(
        user = %config.ssh.settings.user,
        port = config.ssh.settings.port,
        key = %key_source.describe(),
        "remote shell configured"
    );
    let shell = Arc::new(SshShell::new(config.ssh.settings.clone(), key_source));

    FleetDeps {
        connector: Arc::new(DockerConnector::new(ENGINE_CLIENT_TIMEOUT_SECS)),
        shell: shell.clone(),
        files: shell,
        notifier: Arc::new(LogNotifier::new(config.fleet.thresholds)),
    }
}
