//! Error types for the fleetdeck client

use serde::Deserialize;
use thiserror::Error;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Daemon returned an error response
    #[error("API error ({status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
}

impl ClientError {
    /// Build an `Api` error from a non-success response body
    ///
    /// The daemon answers failures with `{"code": ..., "message": ...}`;
    /// anything else is kept verbatim as the message.
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Body {
            code: String,
            message: String,
        }

        match serde_json::from_str::<Body>(body) {
            Ok(Body { code, message }) => Self::Api {
                status,
                code,
                message,
            },
            Err(_) => Self::Api {
                status,
                code: "UNKNOWN".to_string(),
                message: body.trim().to_string(),
            },
        }
    }

    /// HTTP status of an `Api` error
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the daemon reported the host or container as unknown
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_error_body() {
        let err = ClientError::from_response(
            409,
            r#"{"code":"VALIDATION_FAILED","message":"exited with code 1"}"#,
        );
        match &err {
            ClientError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(*status, 409);
                assert_eq!(code, "VALIDATION_FAILED");
                assert_eq!(message, "exited with code 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_plain_error_body() {
        let err = ClientError::from_response(404, "no route\n");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "API error (404, UNKNOWN): no route");
    }
}
