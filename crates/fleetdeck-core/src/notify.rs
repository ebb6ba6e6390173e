//! Notification collaborator

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::ResourceThresholds;
use crate::lifecycle::StateChange;

/// Receives fleet events worth telling a human about
///
/// Calls happen on aggregation paths and must return without blocking.
pub trait Notifier: Send + Sync {
    fn notify_state_change(&self, container: &str, change: StateChange);

    fn notify_high_resource(&self, container: &str, cpu_percent: f64, memory_percent: f64);
}

/// Discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_state_change(&self, _container: &str, _change: StateChange) {}

    fn notify_high_resource(&self, _container: &str, _cpu_percent: f64, _memory_percent: f64) {}
}

/// Emits notifications as log events, rate limited per key
#[derive(Debug)]
pub struct LogNotifier {
    thresholds: ResourceThresholds,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl LogNotifier {
    #[must_use]
    pub fn new(thresholds: ResourceThresholds) -> Self {
        Self {
            thresholds,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the key if its cooldown has passed
    fn claim(&self, key: String) -> bool {
        let cooldown = self.thresholds.cooldown();
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if last_sent
            .get(&key)
            .is_some_and(|at| now.duration_since(*at) < cooldown)
        {
            return false;
        }
        last_sent.insert(key, now);
        true
    }
}

impl Notifier for LogNotifier {
    fn notify_state_change(&self, container: &str, change: StateChange) {
        if self.claim(format!("state:{container}:{change}")) {
            info!(container = %container, change = %change, "container state changed");
        }
    }

    fn notify_high_resource(&self, container: &str, cpu_percent: f64, memory_percent: f64) {
        if cpu_percent > self.thresholds.cpu_percent && self.claim(format!("cpu:{container}")) {
            warn!(
                container = %container,
                cpu_percent,
                threshold = self.thresholds.cpu_percent,
                "high CPU usage"
            );
        }
        if memory_percent > self.thresholds.memory_percent
            && self.claim(format!("mem:{container}"))
        {
            warn!(
                container = %container,
                memory_percent,
                threshold = self.thresholds.memory_percent,
                "high memory usage"
            );
        }
    }
}
