//! Per-host failure backoff

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

/// Tracks recent host failures
///
/// A host that failed within the backoff window is reported unhealthy and
/// skipped by fan-out work until the window passes or it is marked healthy.
#[derive(Debug)]
pub struct HealthTracker {
    backoff: Duration,
    failures: RwLock<HashMap<String, Instant>>,
}

impl HealthTracker {
    #[must_use]
    pub fn new(backoff: Duration) -> Self {
        Self {
            backoff,
            failures: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the host may be contacted
    #[must_use]
    pub fn is_healthy(&self, host_id: &str) -> bool {
        self.failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host_id)
            .is_none_or(|failed_at| failed_at.elapsed() >= self.backoff)
    }

    /// Record a failure now
    pub fn mark_failed(&self, host_id: &str) {
        let previous = self
            .failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host_id.to_string(), Instant::now());
        if previous.is_none() {
            info!(host = %host_id, backoff = ?self.backoff, "host marked failed");
        }
    }

    /// Clear any recorded failure
    pub fn mark_healthy(&self, host_id: &str) {
        let previous = self
            .failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host_id);
        if previous.is_some() {
            info!(host = %host_id, "host recovered");
        }
    }

    /// Drop all state for a host that left the registry
    pub fn forget(&self, host_id: &str) {
        if self
            .failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host_id)
            .is_some()
        {
            debug!(host = %host_id, "health record dropped");
        }
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failure_expires_after_backoff() {
        let health = HealthTracker::new(Duration::from_secs(30));
        assert!(health.is_healthy("nas"));

        health.mark_failed("nas");
        assert!(!health.is_healthy("nas"));
        assert!(health.is_healthy("other"));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!health.is_healthy("nas"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(health.is_healthy("nas"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_healthy_clears_immediately() {
        let health = HealthTracker::new(Duration::from_secs(30));
        health.mark_failed("nas");
        health.mark_healthy("nas");
        assert!(health.is_healthy("nas"));

        health.mark_failed("nas");
        health.forget("nas");
        assert!(health.is_healthy("nas"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failure_restarts_window() {
        let health = HealthTracker::new(Duration::from_secs(30));
        health.mark_failed("nas");
        tokio::time::advance(Duration::from_secs(20)).await;
        health.mark_failed("nas");
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(!health.is_healthy("nas"));
    }
}
