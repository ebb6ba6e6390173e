//! Response types for the API

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ImageUpdateRecord;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Outcome of a state-changing container operation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Outcome of a validated image update
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub success: bool,
    pub message: String,
    pub previous_id: String,
    pub new_id: String,
}

/// All known image update records
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesResponse {
    pub updates: Vec<ImageUpdateRecord>,
    pub available: usize,
}

impl UpdatesResponse {
    pub fn new(updates: Vec<ImageUpdateRecord>) -> Self {
        let available = updates.iter().filter(|u| u.has_update).count();
        Self { updates, available }
    }
}

/// Tail of a container's log output
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogsResponse {
    pub lines: Vec<String>,
}
