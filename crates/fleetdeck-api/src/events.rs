//! Broadcast and terminal socket message types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{ContainerSnapshot, ContainerStatsSnapshot, HostStatsSnapshot};

/// Envelope pushed to every live subscriber
///
/// Serialized as `{"type": "<kind>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WsEvent {
    Containers(Vec<ContainerSnapshot>),
    Stats(Vec<ContainerStatsSnapshot>),
    Hosts(Vec<HostStatsSnapshot>),
    Log(String),
}

impl WsEvent {
    /// Wire name of the envelope kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Containers(_) => "containers",
            Self::Stats(_) => "stats",
            Self::Hosts(_) => "hosts",
            Self::Log(_) => "log",
        }
    }
}

/// Message sent by a terminal client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TerminalClientMessage {
    Input {
        data: String,
    },
    Resize {
        cols: u16,
        rows: u16,
    },
}

/// Message sent to a terminal client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum TerminalServerMessage {
    Output(String),
    Info(String),
    Error(String),
}
