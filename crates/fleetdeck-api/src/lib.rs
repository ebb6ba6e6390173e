//! fleetdeck-api: Shared API types and schemas
//!
//! Contains the fleet data model, request/response types and the broadcast
//! envelope used across the daemon, the core and the CLI.

pub mod events;
pub mod models;
pub mod requests;
pub mod responses;
