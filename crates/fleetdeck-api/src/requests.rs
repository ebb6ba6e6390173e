//! Request types for the API

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Query string for `/api/search`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchQuery {
    pub q: String,
}

/// Query string for `/api/stacks`
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StacksQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

/// Query string for log endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogsQuery {
    /// Number of trailing lines
    #[serde(default = "default_tail")]
    pub tail: u32,
}

impl Default for LogsQuery {
    fn default() -> Self {
        Self {
            tail: default_tail(),
        }
    }
}

fn default_tail() -> u32 {
    100
}

/// Query string for host file listing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FilesQuery {
    /// Absolute directory path
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".to_string()
}

/// Body for creating a directory on a host
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MkdirRequest {
    pub path: String,
}

/// Add or replace a host entry
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertHostRequest {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub is_local: bool,
}
