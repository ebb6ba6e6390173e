//! Application state shared across HTTP handlers

use std::sync::Arc;

use fleetdeck_core::Fleet;

use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// The container fleet
    pub fleet: Fleet,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state
    pub fn new(fleet: Fleet, config: Config) -> Self {
        Self {
            fleet,
            config: Arc::new(config),
        }
    }
}
