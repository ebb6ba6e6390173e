//! Host filesystem access over the SFTP subsystem

use chrono::{DateTime, Utc};
use fleetdeck_api::models::HostFileEntry;
use russh::ChannelStream;
use russh::client::Msg;
use russh_sftp::client::SftpSession;
use tracing::{debug, instrument};

use crate::error::ExecError;
use crate::ssh::SshSession;

/// File operations on one host, valid while the session is open
pub struct RemoteFs {
    sftp: SftpSession,
    session: SshSession,
}

impl RemoteFs {
    pub(crate) async fn start(
        session: SshSession,
        stream: ChannelStream<Msg>,
    ) -> Result<Self, ExecError> {
        let sftp = SftpSession::new(stream)
            .await
            .map_err(|e| ExecError::Sftp(e.to_string()))?;
        Ok(Self { sftp, session })
    }

    /// List a directory, directories first then by name
    ///
    /// # Errors
    /// Returns `ExecError::InvalidPath` for relative paths and
    /// `ExecError::Sftp` if the listing fails
    #[instrument(skip(self), fields(target = %self.session.target()))]
    pub async fn list_dir(&self, path: &str) -> Result<Vec<HostFileEntry>, ExecError> {
        let path = require_absolute(path)?;
        let dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| ExecError::Sftp(e.to_string()))?;

        let mut entries: Vec<HostFileEntry> = dir
            .filter(|entry| !matches!(entry.file_name().as_str(), "." | ".."))
            .map(|entry| {
                let name = entry.file_name();
                let meta = entry.metadata();
                HostFileEntry {
                    path: join_path(path, &name),
                    name,
                    size: meta.size.unwrap_or(0),
                    mod_time: meta
                        .mtime
                        .and_then(|t| DateTime::<Utc>::from_timestamp(i64::from(t), 0)),
                    is_dir: meta.is_dir(),
                }
            })
            .collect();

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        debug!(count = entries.len(), "listed directory");
        Ok(entries)
    }

    /// Read a whole file
    ///
    /// # Errors
    /// Returns an error for relative paths or failed reads
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, ExecError> {
        let path = require_absolute(path)?;
        self.sftp
            .read(path)
            .await
            .map_err(|e| ExecError::Sftp(e.to_string()))
    }

    /// Create or truncate a file with the given contents
    ///
    /// # Errors
    /// Returns an error for relative paths or failed writes
    pub async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), ExecError> {
        let path = require_absolute(path)?;
        self.sftp
            .write(path, data)
            .await
            .map_err(|e| ExecError::Sftp(e.to_string()))
    }

    /// Create a directory
    ///
    /// # Errors
    /// Returns an error for relative paths or if creation fails
    pub async fn make_dir(&self, path: &str) -> Result<(), ExecError> {
        let path = require_absolute(path)?;
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| ExecError::Sftp(e.to_string()))
    }

    /// Remove a file or an empty directory
    ///
    /// # Errors
    /// Returns an error for relative paths, `/`, or failed removals
    pub async fn remove_path(&self, path: &str) -> Result<(), ExecError> {
        let path = require_absolute(path)?;
        if path.trim_end_matches('/').is_empty() {
            return Err(ExecError::InvalidPath(path.to_string()));
        }
        let meta = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| ExecError::Sftp(e.to_string()))?;
        let result = if meta.is_dir() {
            self.sftp.remove_dir(path).await
        } else {
            self.sftp.remove_file(path).await
        };
        result.map_err(|e| ExecError::Sftp(e.to_string()))
    }

    /// Close the subsystem and the underlying session
    pub async fn close(self) {
        if let Err(e) = self.sftp.close().await {
            debug!(error = %e, "sftp close failed");
        }
        self.session.close().await;
    }
}

fn require_absolute(path: &str) -> Result<&str, ExecError> {
    if path.starts_with('/') {
        Ok(path)
    } else {
        Err(ExecError::InvalidPath(path.to_string()))
    }
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_absolute() {
        assert!(require_absolute("/etc").is_ok());
        assert!(matches!(
            require_absolute("etc/passwd"),
            Err(ExecError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "etc"), "/etc");
        assert_eq!(join_path("/var/log", "syslog"), "/var/log/syslog");
    }
}
