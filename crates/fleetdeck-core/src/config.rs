//! Tunables for fleet aggregation, caching and background work

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::update::UpdatePolicy;

/// Fleet-wide timing and threshold settings
///
/// Every field has a default so a missing `[fleet]` section yields a working
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSettings {
    /// How long a failed host is skipped before it is tried again
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    /// Per-host deadline for on-demand listings
    #[serde(default = "default_list_deadline_secs")]
    pub list_deadline_secs: u64,
    /// Engine ping timeout used by host stats
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    /// Per-container sample timeout inside host stats
    #[serde(default = "default_host_sample_timeout_secs")]
    pub host_sample_timeout_secs: u64,
    /// Per-container sample timeout for the stats feed
    #[serde(default = "default_stats_timeout_secs")]
    pub stats_timeout_secs: u64,
    /// Concurrent stats samples per host
    #[serde(default = "default_stats_concurrency")]
    pub stats_concurrency: usize,
    /// Lifetime of a cached disk reading
    #[serde(default = "default_disk_ttl_secs")]
    pub disk_ttl_secs: u64,
    /// Deadline for one disk usage command
    #[serde(default = "default_disk_timeout_secs")]
    pub disk_timeout_secs: u64,
    /// Lifetime of a cached image update check
    #[serde(default = "default_update_ttl_secs")]
    pub update_ttl_secs: u64,
    /// Image checks in flight at once
    #[serde(default = "default_update_concurrency")]
    pub update_concurrency: usize,
    /// Delay before the first periodic image check
    #[serde(default = "default_update_initial_delay_secs")]
    pub update_initial_delay_secs: u64,
    /// Period of the background image check
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    /// Deadline for one full background image check
    #[serde(default = "default_update_run_timeout_secs")]
    pub update_run_timeout_secs: u64,
    /// Upper bound for a single validated update
    #[serde(default = "default_update_deadline_secs")]
    pub update_deadline_secs: u64,
    /// Deadline for pulling an image during an update
    #[serde(default = "default_pull_timeout_secs")]
    pub pull_timeout_secs: u64,
    /// How long a validation container may take to prove itself
    #[serde(default = "default_validation_window_secs")]
    pub validation_window_secs: u64,
    /// Broadcast period
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,
    /// Deadline for one broadcast tick
    #[serde(default = "default_broadcast_deadline_secs")]
    pub broadcast_deadline_secs: u64,
    /// Write timeout for push subscribers
    #[serde(default = "default_push_timeout_secs")]
    pub push_timeout_secs: u64,
    /// Envelopes queued per push subscriber before new ones are dropped
    #[serde(default = "default_push_queue")]
    pub push_queue: usize,
    /// Passes a container may be missing before its lifecycle entry is dropped
    #[serde(default = "default_eviction_passes")]
    pub eviction_passes: u32,
    /// Delay before re-broadcasting containers after an action
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,
    /// Notification thresholds
    #[serde(default)]
    pub thresholds: ResourceThresholds,
}

fn default_backoff_secs() -> u64 {
    30
}

fn default_list_deadline_secs() -> u64 {
    8
}

fn default_ping_timeout_secs() -> u64 {
    3
}

fn default_host_sample_timeout_secs() -> u64 {
    4
}

fn default_stats_timeout_secs() -> u64 {
    5
}

fn default_stats_concurrency() -> usize {
    8
}

fn default_disk_ttl_secs() -> u64 {
    30
}

fn default_disk_timeout_secs() -> u64 {
    5
}

fn default_update_ttl_secs() -> u64 {
    15 * 60
}

fn default_update_concurrency() -> usize {
    5
}

fn default_update_initial_delay_secs() -> u64 {
    30
}

fn default_update_interval_secs() -> u64 {
    15 * 60
}

fn default_update_run_timeout_secs() -> u64 {
    5 * 60
}

fn default_update_deadline_secs() -> u64 {
    10 * 60
}

fn default_pull_timeout_secs() -> u64 {
    5 * 60
}

fn default_validation_window_secs() -> u64 {
    30
}

fn default_broadcast_interval_secs() -> u64 {
    2
}

fn default_broadcast_deadline_secs() -> u64 {
    8
}

fn default_push_timeout_secs() -> u64 {
    5
}

fn default_push_queue() -> usize {
    16
}

fn default_eviction_passes() -> u32 {
    3
}

fn default_refresh_delay_ms() -> u64 {
    500
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            backoff_secs: default_backoff_secs(),
            list_deadline_secs: default_list_deadline_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            host_sample_timeout_secs: default_host_sample_timeout_secs(),
            stats_timeout_secs: default_stats_timeout_secs(),
            stats_concurrency: default_stats_concurrency(),
            disk_ttl_secs: default_disk_ttl_secs(),
            disk_timeout_secs: default_disk_timeout_secs(),
            update_ttl_secs: default_update_ttl_secs(),
            update_concurrency: default_update_concurrency(),
            update_initial_delay_secs: default_update_initial_delay_secs(),
            update_interval_secs: default_update_interval_secs(),
            update_run_timeout_secs: default_update_run_timeout_secs(),
            update_deadline_secs: default_update_deadline_secs(),
            pull_timeout_secs: default_pull_timeout_secs(),
            validation_window_secs: default_validation_window_secs(),
            broadcast_interval_secs: default_broadcast_interval_secs(),
            broadcast_deadline_secs: default_broadcast_deadline_secs(),
            push_timeout_secs: default_push_timeout_secs(),
            push_queue: default_push_queue(),
            eviction_passes: default_eviction_passes(),
            refresh_delay_ms: default_refresh_delay_ms(),
            thresholds: ResourceThresholds::default(),
        }
    }
}

impl FleetSettings {
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    #[must_use]
    pub fn list_deadline(&self) -> Duration {
        Duration::from_secs(self.list_deadline_secs)
    }

    #[must_use]
    pub fn update_ttl(&self) -> Duration {
        Duration::from_secs(self.update_ttl_secs)
    }

    #[must_use]
    pub fn update_deadline(&self) -> Duration {
        Duration::from_secs(self.update_deadline_secs)
    }

    #[must_use]
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    /// Timeouts used by the aggregator
    #[must_use]
    pub fn aggregator_timeouts(&self) -> AggregatorTimeouts {
        AggregatorTimeouts {
            ping: Duration::from_secs(self.ping_timeout_secs),
            host_sample: Duration::from_secs(self.host_sample_timeout_secs),
            container_sample: Duration::from_secs(self.stats_timeout_secs),
            sample_concurrency: self.stats_concurrency.max(1),
        }
    }

    /// Broadcaster cadence
    #[must_use]
    pub fn broadcaster(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            interval: Duration::from_secs(self.broadcast_interval_secs.max(1)),
            tick_deadline: Duration::from_secs(self.broadcast_deadline_secs.max(1)),
        }
    }

    /// Schedule of the background image check
    #[must_use]
    pub fn update_schedule(&self) -> UpdateSchedule {
        UpdateSchedule {
            initial_delay: Duration::from_secs(self.update_initial_delay_secs),
            interval: Duration::from_secs(self.update_interval_secs.max(1)),
            run_timeout: Duration::from_secs(self.update_run_timeout_secs),
        }
    }

    /// Timing of validated updates
    #[must_use]
    pub fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy {
            pull_timeout: Duration::from_secs(self.pull_timeout_secs),
            validation_window: Duration::from_secs(self.validation_window_secs),
            ..UpdatePolicy::default()
        }
    }
}

/// Timeouts applied by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorTimeouts {
    pub ping: Duration,
    pub host_sample: Duration,
    pub container_sample: Duration,
    pub sample_concurrency: usize,
}

impl Default for AggregatorTimeouts {
    fn default() -> Self {
        FleetSettings::default().aggregator_timeouts()
    }
}

/// Broadcaster cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcasterConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Deadline for one tick
    pub tick_deadline: Duration,
}

/// Background image check schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSchedule {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub run_timeout: Duration,
}

/// Levels above which resource notifications fire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceThresholds {
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,
    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,
    /// Minimum time between two notifications with the same key
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_cpu_percent() -> f64 {
    80.0
}

fn default_memory_percent() -> f64 {
    90.0
}

fn default_cooldown_secs() -> u64 {
    5 * 60
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: default_cpu_percent(),
            memory_percent: default_memory_percent(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl ResourceThresholds {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_section_uses_defaults() {
        let settings: FleetSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, FleetSettings::default());
        assert_eq!(settings.backoff(), Duration::from_secs(30));
        assert_eq!(settings.update_ttl(), Duration::from_secs(900));
        assert_eq!(settings.broadcaster().interval, Duration::from_secs(2));
    }

    #[test]
    fn test_partial_thresholds() {
        let settings: FleetSettings =
            serde_json::from_str(r#"{"backoff_secs": 10, "thresholds": {"cpu_percent": 50.0}}"#)
                .unwrap();
        assert_eq!(settings.backoff_secs, 10);
        assert!((settings.thresholds.cpu_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(settings.thresholds.cooldown_secs, 300);
    }
}
