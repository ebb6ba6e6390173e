//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fleetdeck_api::models::UnknownAction;
use fleetdeck_core::{CoreError, UpdateError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

/// Wrapper for API errors with status codes
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ApiError,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError::new(code, message),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::internal(message),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        if err.is_not_found() {
            return Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message);
        }
        if err.is_invalid_input() {
            return Self::bad_request(message);
        }
        match err {
            CoreError::NotConnected(_) | CoreError::Update(UpdateError::NotConnected(_)) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "HOST_UNAVAILABLE", message)
            }
            CoreError::Timeout | CoreError::Update(UpdateError::DeadlineExceeded { .. }) => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", message)
            }
            CoreError::Update(UpdateError::ValidationTimeout { .. })
            | CoreError::Update(UpdateError::ValidationUnhealthy { .. }) => {
                Self::new(StatusCode::CONFLICT, "VALIDATION_FAILED", message)
            }
            CoreError::Update(_) => Self::new(StatusCode::BAD_GATEWAY, "UPDATE_FAILED", message),
            CoreError::CommandFailed { .. } | CoreError::NoRouteSucceeded { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, "ACTION_FAILED", message)
            }
            CoreError::Engine(_) | CoreError::Shell(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
            }
            _ => Self::internal(message),
        }
    }
}

impl From<UnknownAction> for AppError {
    fn from(err: UnknownAction) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, code = %self.error.code, message = %self.error.message, "request failed");
        }
        (self.status, Json(self.error)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fleetdeck_engine::EngineError;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::HostNotFound("x".into()), StatusCode::NOT_FOUND),
            (
                CoreError::Engine(EngineError::NotFound("abc".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::InvalidContainerRef("a;b".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::NotConnected("nas".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (CoreError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (
                CoreError::Update(UpdateError::ValidationTimeout {
                    waited: Duration::from_secs(31),
                }),
                StatusCode::CONFLICT,
            ),
            (
                CoreError::Update(UpdateError::CreateReplacement(EngineError::Timeout)),
                StatusCode::BAD_GATEWAY,
            ),
            (
                CoreError::Update(UpdateError::DeadlineExceeded {
                    step: fleetdeck_core::UpdateStep::Swapping,
                    waited: Duration::from_secs(600),
                }),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                CoreError::ActorError("stopped".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn test_unknown_action_is_bad_request() {
        let err = AppError::from(UnknownAction("explode".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.error.message.contains("explode"));
    }
}
