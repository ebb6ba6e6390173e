//! SSH sessions using the russh crate
//!
//! Every operation dials a fresh session: hosts are reached through an
//! ordered candidate list, and keeping long-lived sessions across address
//! changes is more trouble than a handshake per command.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use fleetdeck_api::models::{HostDescriptor, HostFileEntry};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, ssh_key};
use russh::{ChannelMsg, Disconnect, client};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::candidates::ssh_candidates;
use crate::error::ExecError;
use crate::keys::{KeySource, KeyStore};
use crate::result::{CommandResult, SshSettings};
use crate::sftp::RemoteFs;
use crate::terminal::{PtySize, TERM, TerminalBridge, TerminalEnds, TerminalInput, TerminalTarget};
use crate::traits::{RemoteFiles, RemoteShell};

/// SSH client handler for russh
#[derive(Debug)]
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Fleet hosts are addressed by several names, host keys are not pinned
        Ok(true)
    }
}

/// Dials fleet hosts over SSH
pub struct SshShell {
    settings: SshSettings,
    keys: KeyStore,
}

impl std::fmt::Debug for SshShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshShell")
            .field("settings", &self.settings)
            .field("keys", &self.keys)
            .finish()
    }
}

impl SshShell {
    /// Create a new shell dialer
    ///
    /// The key is not read until the first dial.
    pub fn new(settings: SshSettings, key_source: KeySource) -> Self {
        Self {
            settings,
            keys: KeyStore::new(key_source),
        }
    }

    /// Get connection settings
    pub fn settings(&self) -> &SshSettings {
        &self.settings
    }

    /// Open an authenticated session, trying each candidate address in order
    ///
    /// # Errors
    /// Returns `ExecError::ConfigError` if the key cannot be loaded,
    /// `ExecError::NoCandidates` if no address can be derived and
    /// `ExecError::AllCandidatesFailed` once every candidate has failed.
    #[instrument(skip(self, host), fields(host = %host.id))]
    pub async fn dial(&self, host: &HostDescriptor) -> Result<SshSession, ExecError> {
        let key = self
            .keys
            .get()
            .map_err(|e| ExecError::ConfigError(e.to_string()))?;

        let candidates = ssh_candidates(host);
        if candidates.is_empty() {
            return Err(ExecError::NoCandidates(host.id.clone()));
        }

        let connect_timeout = self.settings.connect_timeout();
        let mut last_error = None;

        for candidate in &candidates {
            debug!(candidate = %candidate, "dialing ssh candidate");
            match timeout(connect_timeout, self.connect(candidate, key.clone())).await {
                Ok(Ok(handle)) => {
                    info!(candidate = %candidate, "ssh session established");
                    return Ok(SshSession {
                        handle,
                        target: candidate.clone(),
                    });
                }
                Ok(Err(e)) => {
                    debug!(candidate = %candidate, error = %e, "ssh candidate failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    debug!(candidate = %candidate, "ssh candidate timed out");
                    last_error = Some(ExecError::Timeout {
                        timeout: connect_timeout,
                    });
                }
            }
        }

        let last = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!(attempts = candidates.len(), error = %last, "all ssh candidates failed");
        Err(ExecError::AllCandidatesFailed {
            host: host.id.clone(),
            attempts: candidates.len(),
            last,
        })
    }

    async fn connect(
        &self,
        address: &str,
        key: Arc<PrivateKey>,
    ) -> Result<client::Handle<SshClientHandler>, ExecError> {
        let config = Arc::new(client::Config::default());

        let mut session = client::connect(config, (address, self.settings.port), SshClientHandler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth_res = session
            .authenticate_publickey(
                &self.settings.user,
                PrivateKeyWithHashAlg::new(key, hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(format!(
                "public key rejected for user {}",
                self.settings.user
            )));
        }

        Ok(session)
    }

    /// Open the file transfer subsystem on a host
    ///
    /// # Errors
    /// Returns an error if dialing or subsystem negotiation fails
    pub async fn open_fs(&self, host: &HostDescriptor) -> Result<RemoteFs, ExecError> {
        self.dial(host).await?.into_fs().await
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    #[instrument(skip(self, host), fields(host = %host.id))]
    async fn run_command(
        &self,
        host: &HostDescriptor,
        cmd: &str,
    ) -> Result<CommandResult, ExecError> {
        let session = self.dial(host).await?;
        let result = session.exec(cmd).await;
        session.close().await;
        result
    }

    #[instrument(skip(self, host), fields(host = %host.id))]
    async fn open_terminal(
        &self,
        host: &HostDescriptor,
        target: TerminalTarget,
        size: PtySize,
    ) -> Result<TerminalBridge, ExecError> {
        let command = target.command()?;
        let session = self.dial(host).await?;
        session.open_pty(command, size).await
    }

    fn shell_type(&self) -> &'static str {
        "ssh"
    }
}

#[async_trait]
impl RemoteFiles for SshShell {
    #[instrument(skip(self, host), fields(host = %host.id))]
    async fn list_dir(
        &self,
        host: &HostDescriptor,
        path: &str,
    ) -> Result<Vec<HostFileEntry>, ExecError> {
        let fs = self.open_fs(host).await?;
        let result = fs.list_dir(path).await;
        fs.close().await;
        result
    }

    #[instrument(skip(self, host), fields(host = %host.id))]
    async fn read_file(&self, host: &HostDescriptor, path: &str) -> Result<Vec<u8>, ExecError> {
        let fs = self.open_fs(host).await?;
        let result = fs.read_file(path).await;
        fs.close().await;
        result
    }

    #[instrument(skip(self, host, data), fields(host = %host.id, bytes = data.len()))]
    async fn write_file(
        &self,
        host: &HostDescriptor,
        path: &str,
        data: &[u8],
    ) -> Result<(), ExecError> {
        let fs = self.open_fs(host).await?;
        let result = fs.write_file(path, data).await;
        fs.close().await;
        result
    }

    #[instrument(skip(self, host), fields(host = %host.id))]
    async fn make_dir(&self, host: &HostDescriptor, path: &str) -> Result<(), ExecError> {
        let fs = self.open_fs(host).await?;
        let result = fs.make_dir(path).await;
        fs.close().await;
        result
    }

    #[instrument(skip(self, host), fields(host = %host.id))]
    async fn remove_path(&self, host: &HostDescriptor, path: &str) -> Result<(), ExecError> {
        let fs = self.open_fs(host).await?;
        let result = fs.remove_path(path).await;
        fs.close().await;
        result
    }
}

/// An authenticated SSH connection to one candidate address
pub struct SshSession {
    handle: client::Handle<SshClientHandler>,
    target: String,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Address this session was established with
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Execute a command and collect its output
    ///
    /// # Errors
    /// Returns `ExecError::IoError` if the channel fails
    #[instrument(skip(self, cmd), fields(target = %self.target))]
    pub async fn exec(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // exit status may arrive before trailing data, drain until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    stderr.extend_from_slice(&data);
                }
                ChannelMsg::ExitStatus { exit_status } => status = exit_status.cast_signed(),
                _ => {}
            }
        }

        let duration = start.elapsed();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        Ok(CommandResult {
            status,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            duration,
        })
    }

    /// Allocate a pseudo-terminal and bridge it to channels
    ///
    /// Runs `command` when given, otherwise the login shell. The session is
    /// moved into the pump task and closed when the terminal ends.
    ///
    /// # Errors
    /// Returns `ExecError::IoError` if the channel or PTY cannot be set up
    pub async fn open_pty(
        self,
        command: Option<String>,
        size: PtySize,
    ) -> Result<TerminalBridge, ExecError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .request_pty(
                false,
                TERM,
                u32::from(size.cols),
                u32::from(size.rows),
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        match &command {
            Some(cmd) => channel.exec(true, cmd.as_str()).await,
            None => channel.request_shell(true).await,
        }
        .map_err(|e| ExecError::IoError(e.to_string()))?;

        info!(target = %self.target, command = ?command, "terminal opened");

        let (bridge, ends) = TerminalBridge::pair();
        tokio::spawn(pump_terminal(self, channel, ends));
        Ok(bridge)
    }

    /// Switch this session to the SFTP subsystem
    ///
    /// # Errors
    /// Returns `ExecError::Sftp` if the subsystem is unavailable
    pub async fn into_fs(self) -> Result<RemoteFs, ExecError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| ExecError::Sftp(e.to_string()))?;
        RemoteFs::start(self, channel.into_stream()).await
    }

    /// Disconnect, logging rather than failing on errors
    pub async fn close(self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(target = %self.target, error = %e, "ssh disconnect failed");
        }
    }
}

async fn pump_terminal(
    session: SshSession,
    mut channel: russh::Channel<client::Msg>,
    mut ends: TerminalEnds,
) {
    loop {
        tokio::select! {
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. }) => {
                    if ends.output.send(data.to_vec()).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
            input = ends.input.recv() => match input {
                Some(TerminalInput::Data(bytes)) => {
                    if let Err(e) = channel.data(&bytes[..]).await {
                        warn!(target = %session.target, error = %e, "terminal write failed");
                        break;
                    }
                }
                Some(TerminalInput::Resize(size)) => {
                    if let Err(e) = channel
                        .window_change(u32::from(size.cols), u32::from(size.rows), 0, 0)
                        .await
                    {
                        debug!(target = %session.target, error = %e, "window change failed");
                    }
                }
                None => break,
            },
        }
    }

    if let Err(e) = channel.close().await {
        debug!(target = %session.target, error = %e, "terminal channel close failed");
    }
    info!(target = %session.target, "terminal closed");
    session.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unloadable_key_is_config_error() {
        let shell = SshShell::new(
            SshSettings::default(),
            KeySource::path("/nonexistent/fleetdeck/id_rsa"),
        );
        let host = HostDescriptor::new("nas", "NAS", "tcp://nas.lan:2375", false);

        let err = shell.dial(&host).await.unwrap_err();
        assert!(matches!(err, ExecError::ConfigError(_)));

        // cached: same answer without touching the filesystem again
        let err = shell.run_command(&host, "true").await.unwrap_err();
        assert!(matches!(err, ExecError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_invalid_container_ref_rejected_before_dial() {
        let shell = SshShell::new(
            SshSettings::default(),
            KeySource::path("/nonexistent/fleetdeck/id_rsa"),
        );
        let host = HostDescriptor::local_default();

        let err = shell
            .open_terminal(
                &host,
                TerminalTarget::ContainerExec("x; reboot".into()),
                PtySize::container_default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::InvalidContainerRef(_)));
    }
}
