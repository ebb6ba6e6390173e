//! Error types for fleetdeck-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a host over the remote shell
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to a candidate address
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Every candidate address was tried and none accepted a session
    #[error("all ssh candidates failed for {host} ({attempts} tried): last error: {last}")]
    AllCandidatesFailed {
        /// Host id
        host: String,
        /// Number of candidates attempted
        attempts: usize,
        /// Error from the final attempt
        last: String,
    },

    /// No candidate address could be derived for the host
    #[error("no ssh candidates for host {0}")]
    NoCandidates(String),

    /// Command or connection attempt timed out
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Channel or stream I/O error
    #[error("I/O error: {0}")]
    IoError(String),

    /// File transfer subsystem error
    #[error("sftp error: {0}")]
    Sftp(String),

    /// Remote path rejected before use
    #[error("invalid path: {0} (must be absolute)")]
    InvalidPath(String),

    /// Container reference rejected before interpolation into a command
    #[error("invalid container reference: {0}")]
    InvalidContainerRef(String),

    /// Invalid configuration, including unusable key material
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl ExecError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::Timeout { .. }
                | ExecError::AllCandidatesFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_not_retryable() {
        assert!(!ExecError::ConfigError("bad key".into()).is_retryable());
        assert!(
            ExecError::Timeout {
                timeout: Duration::from_secs(8)
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_aggregate_message_names_host() {
        let err = ExecError::AllCandidatesFailed {
            host: "nas".into(),
            attempts: 2,
            last: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "all ssh candidates failed for nas (2 tried): last error: connection refused"
        );
    }
}
