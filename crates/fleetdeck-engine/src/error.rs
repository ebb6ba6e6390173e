//! Error types for fleetdeck-engine

use thiserror::Error;

/// Errors returned by container engine operations
///
/// The variants separate transport failures (the host is unreachable and
/// should be backed off) from structured API rejections (the host answered
/// but refused, which routes work to the remote shell instead).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Could not reach the engine at all
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    /// Request exceeded its deadline
    #[error("engine request timed out")]
    Timeout,

    /// Engine refused the request (authorization plugin, rootless limits)
    #[error("engine rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Engine message
        message: String,
    },

    /// Container or image does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other API error
    #[error("engine API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Engine message
        message: String,
    },

    /// A streamed response (pull progress, logs, exec) failed midway
    #[error("stream error: {0}")]
    Stream(String),

    /// Engine address or client setup is invalid
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether the host should be considered unreachable
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, EngineError::Unreachable(_) | EngineError::Timeout)
    }

    /// Whether an operation should be retried through the remote shell
    #[must_use]
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            EngineError::Unreachable(_) | EngineError::Timeout | EngineError::Rejected { .. }
        )
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_unreachable()
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error;

        match err {
            Error::DockerResponseServerError {
                status_code,
                message,
            } => match status_code {
                401 | 403 => EngineError::Rejected {
                    status: status_code,
                    message,
                },
                404 => EngineError::NotFound(message),
                _ => EngineError::Api {
                    status: status_code,
                    message,
                },
            },
            Error::RequestTimeoutError => EngineError::Timeout,
            other => EngineError::Unreachable(other.to_string()),
        }
    }
}
