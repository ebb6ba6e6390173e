//! Remote shell trait

use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_api::models::{HostDescriptor, HostFileEntry};

use crate::error::ExecError;
use crate::result::CommandResult;
use crate::terminal::{PtySize, TerminalBridge, TerminalTarget};

/// Command execution and interactive terminals on fleet hosts
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command to completion, capturing stdout and stderr
    ///
    /// A non-zero exit status is reported in the result, not as an error.
    async fn run_command(
        &self,
        host: &HostDescriptor,
        cmd: &str,
    ) -> Result<CommandResult, ExecError>;

    /// Run a command with an overall deadline
    async fn run_with_timeout(
        &self,
        host: &HostDescriptor,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        tokio::time::timeout(timeout, self.run_command(host, cmd))
            .await
            .map_err(|_| ExecError::Timeout { timeout })?
    }

    /// Open an interactive terminal with a pseudo-terminal attached
    async fn open_terminal(
        &self,
        host: &HostDescriptor,
        target: TerminalTarget,
        size: PtySize,
    ) -> Result<TerminalBridge, ExecError>;

    /// Get shell type name (for logging)
    fn shell_type(&self) -> &'static str;
}

/// File access on fleet hosts
#[async_trait]
pub trait RemoteFiles: Send + Sync {
    /// List an absolute directory path
    async fn list_dir(
        &self,
        host: &HostDescriptor,
        path: &str,
    ) -> Result<Vec<HostFileEntry>, ExecError>;

    /// Read a whole file
    async fn read_file(&self, host: &HostDescriptor, path: &str) -> Result<Vec<u8>, ExecError>;

    /// Create or replace a file
    async fn write_file(
        &self,
        host: &HostDescriptor,
        path: &str,
        data: &[u8],
    ) -> Result<(), ExecError>;

    /// Create a directory
    async fn make_dir(&self, host: &HostDescriptor, path: &str) -> Result<(), ExecError>;

    /// Remove a file or empty directory
    async fn remove_path(&self, host: &HostDescriptor, path: &str) -> Result<(), ExecError>;
}
