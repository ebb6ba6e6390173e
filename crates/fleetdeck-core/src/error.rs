//! Core error types for fleetdeck-core

use fleetdeck_engine::EngineError;
use fleetdeck_exec::ExecError;
use thiserror::Error;

use crate::update::UpdateError;

/// Errors that can occur in fleet operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Host not found in registry
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// No engine client is available for the host
    #[error("host not connected: {0}")]
    NotConnected(String),

    /// Container not present in the latest listing
    #[error("container not found: {host}/{container}")]
    ContainerNotFound {
        /// Host id
        host: String,
        /// Container id
        container: String,
    },

    /// Container id is unsafe to pass to a shell
    #[error("invalid container reference: {0}")]
    InvalidContainerRef(String),

    /// Action name not recognised
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Engine API call failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Remote shell failed
    #[error(transparent)]
    Shell(#[from] ExecError),

    /// Remote shell ran the command but it exited non-zero
    #[error("{action} failed: {output}")]
    CommandFailed {
        /// Operation attempted
        action: String,
        /// Combined command output
        output: String,
    },

    /// Every route for an operation fell through
    #[error("{operation}: no route succeeded: {reason}")]
    NoRouteSucceeded {
        /// Operation attempted
        operation: String,
        /// Reason given by the last route
        reason: String,
    },

    /// Validated image update failed
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Operation timed out
    #[error("operation timeout")]
    Timeout,

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl CoreError {
    /// Whether the error means the caller asked for something absent
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::HostNotFound(_)
                | CoreError::ContainerNotFound { .. }
                | CoreError::Engine(EngineError::NotFound(_))
        )
    }

    /// Whether the error came from bad caller input
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidContainerRef(_)
                | CoreError::UnknownAction(_)
                | CoreError::Shell(ExecError::InvalidPath(_) | ExecError::InvalidContainerRef(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(CoreError::HostNotFound("nas".into()).is_not_found());
        assert!(CoreError::Engine(EngineError::NotFound("abc".into())).is_not_found());
        assert!(!CoreError::NotConnected("nas".into()).is_not_found());
        assert!(CoreError::Shell(ExecError::InvalidPath("etc".into())).is_invalid_input());
        assert!(!CoreError::Timeout.is_invalid_input());
    }
}
