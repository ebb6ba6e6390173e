//! Image update detection
//!
//! Compares the digest a container's image was pulled with against the
//! digest its registry serves now. Registry round trips are slow and rate
//! limited, so results are cached per container.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use fleetdeck_api::models::{ContainerSnapshot, ImageUpdateRecord};
use fleetdeck_engine::ContainerEngine;
use futures::StreamExt;
use futures::stream;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::aggregator::Aggregator;
use crate::config::UpdateSchedule;
use crate::error::CoreError;
use crate::pool::ConnectionPool;

/// Label that opts a container out of update checks when set to `false`
pub const EXCLUDE_LABEL: &str = "com.centurylinklabs.watchtower.enable";

const LATEST_TAG_PREFIX: usize = 15;

#[derive(Debug, Clone)]
struct CachedRecord {
    checked: Instant,
    record: ImageUpdateRecord,
}

/// Cached registry digest comparison
pub struct UpdateChecker {
    pool: Arc<ConnectionPool>,
    ttl: Duration,
    concurrency: usize,
    cache: RwLock<HashMap<String, CachedRecord>>,
}

impl UpdateChecker {
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>, ttl: Duration, concurrency: usize) -> Self {
        Self {
            pool,
            ttl,
            concurrency: concurrency.max(1),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Check one container, serving from cache while the entry is fresh
    ///
    /// # Errors
    /// Returns an error if the host has no client or the local image cannot
    /// be inspected
    #[instrument(skip(self, container), fields(host = %container.host_id, container = %container.id))]
    pub async fn check(&self, container: &ContainerSnapshot) -> Result<ImageUpdateRecord, CoreError> {
        if let Some(record) = self.fresh(&container.id) {
            debug!("update check served from cache");
            return Ok(record);
        }

        let engine = self.pool.get(&container.host_id)?;
        let record = evaluate(engine.as_ref(), container).await?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                container.id.clone(),
                CachedRecord {
                    checked: Instant::now(),
                    record: record.clone(),
                },
            );
        Ok(record)
    }

    /// Check every running container, a bounded number at a time
    ///
    /// Containers whose check fails are left out.
    pub async fn check_all(&self, containers: &[ContainerSnapshot]) -> Vec<ImageUpdateRecord> {
        let checks: Vec<_> = containers
            .iter()
            .filter(|c| c.state.is_running())
            .map(|c| async move {
                match self.check(c).await {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(host = %c.host_id, container = %c.id, error = %e, "update check failed");
                        None
                    }
                }
            })
            .collect();

        let mut records: Vec<ImageUpdateRecord> = stream::iter(checks)
            .buffer_unordered(self.concurrency)
            .filter_map(|r| async move { r })
            .collect()
            .await;
        records.sort_by(|a, b| a.container_name.cmp(&b.container_name));
        records
    }

    fn fresh(&self, container_id: &str) -> Option<ImageUpdateRecord> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(container_id)
            .filter(|c| c.checked.elapsed() < self.ttl)
            .map(|c| c.record.clone())
    }

    /// Every cached record, fresh or not, sorted by container name
    #[must_use]
    pub fn cached(&self) -> Vec<ImageUpdateRecord> {
        let mut records: Vec<ImageUpdateRecord> = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|c| c.record.clone())
            .collect();
        records.sort_by(|a, b| a.container_name.cmp(&b.container_name));
        records
    }

    /// Drop the cached record for a container
    pub fn invalidate(&self, container_id: &str) -> bool {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(container_id)
            .is_some()
    }

    /// Start the background checker
    ///
    /// Waits `initial_delay`, then checks the whole fleet every `interval`.
    pub fn spawn_periodic(
        self: Arc<Self>,
        aggregator: Aggregator,
        list_deadline: Duration,
        schedule: UpdateSchedule,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            sleep(schedule.initial_delay).await;
            let mut ticker = interval_at(Instant::now(), schedule.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let run = async {
                    let containers = aggregator.list_all_containers(list_deadline).await;
                    self.check_all(&containers).await
                };
                match timeout(schedule.run_timeout, run).await {
                    Ok(records) => {
                        let available = records.iter().filter(|r| r.has_update).count();
                        info!(checked = records.len(), available, "image update check complete");
                    }
                    Err(_) => warn!(timeout = ?schedule.run_timeout, "image update check timed out"),
                }
            }
        })
    }
}

impl std::fmt::Debug for UpdateChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateChecker")
            .field("ttl", &self.ttl)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// Compare a container's local image against the registry
async fn evaluate(
    engine: &dyn ContainerEngine,
    container: &ContainerSnapshot,
) -> Result<ImageUpdateRecord, CoreError> {
    let mut record = ImageUpdateRecord {
        container_id: container.id.clone(),
        container_name: container.name.clone(),
        image: container.image.clone(),
        host_id: container.host_id.clone(),
        current_digest: String::new(),
        latest_digest: None,
        current_tag: image_tag(&container.image).to_string(),
        latest_tag: None,
        has_update: false,
        checked_at: Utc::now(),
    };

    if container
        .labels
        .get(EXCLUDE_LABEL)
        .is_some_and(|v| v.eq_ignore_ascii_case("false"))
    {
        debug!(container = %container.id, "update checks disabled by label");
        return Ok(record);
    }

    let local = engine.inspect_image(&container.image).await?;
    record.current_digest = local
        .repo_digests
        .first()
        .map(|d| d.rsplit_once('@').map_or(d.as_str(), |(_, digest)| digest))
        .unwrap_or_default()
        .to_string();

    let remote = match engine.registry_digest(&container.image).await {
        Ok(digest) => digest,
        Err(e) => {
            debug!(image = %container.image, error = %e, "registry digest unavailable");
            return Ok(record);
        }
    };

    record.has_update = has_update(&record.current_digest, &remote);
    if record.has_update {
        let prefix: String = remote.chars().take(LATEST_TAG_PREFIX).collect();
        record.latest_tag = Some(format!("{prefix}..."));
    }
    record.latest_digest = Some(remote);
    Ok(record)
}

/// Whether the registry digest differs from the local one
///
/// An unknown local digest (locally built image) never reports an update.
#[must_use]
pub fn has_update(current_digest: &str, remote_digest: &str) -> bool {
    !current_digest.is_empty() && !remote_digest.is_empty() && !current_digest.contains(remote_digest)
}

/// Tag part of an image reference, `latest` when absent
#[must_use]
pub fn image_tag(image: &str) -> &str {
    let reference = image.split_once('@').map_or(image, |(name, _)| name);
    let last_segment = reference.rsplit('/').next().unwrap_or(reference);
    match last_segment.rsplit_once(':') {
        Some((_, tag)) if !tag.is_empty() => tag,
        _ => "latest",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tag() {
        assert_eq!(image_tag("nginx"), "latest");
        assert_eq!(image_tag("nginx:1.27"), "1.27");
        assert_eq!(image_tag("registry.local:5000/team/app"), "latest");
        assert_eq!(image_tag("registry.local:5000/team/app:v2"), "v2");
        assert_eq!(image_tag("app@sha256:abc"), "latest");
    }

    #[test]
    fn test_has_update() {
        assert!(!has_update("sha256:aaa", "sha256:aaa"));
        assert!(has_update("sha256:aaa", "sha256:bbb"));
        assert!(!has_update("", "sha256:bbb"));
        assert!(!has_update("sha256:aaa", ""));
    }
}
