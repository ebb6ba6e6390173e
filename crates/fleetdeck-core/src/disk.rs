//! Host disk usage sampling

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fleetdeck_api::models::{DiskVolumeInfo, HostDescriptor};
use fleetdeck_exec::RemoteShell;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Command run on the host to report mounted volumes in bytes
pub const DISK_COMMAND: &str = "df -B1 / /mnt /media /run/media 2>/dev/null";

const PSEUDO_FILESYSTEMS: &[&str] = &[
    "tmpfs", "devtmpfs", "overlay", "shm", "proc", "sysfs", "none", "cgroup",
];

/// Parse `df -B1` output into volumes
///
/// Pseudo filesystems, zero-sized entries and duplicate
/// (device, mount point) pairs are dropped.
#[must_use]
pub fn parse_df_output(output: &str) -> Vec<DiskVolumeInfo> {
    let mut volumes: Vec<DiskVolumeInfo> = Vec::new();

    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            continue;
        }
        let device = fields[0];
        if PSEUDO_FILESYSTEMS.iter().any(|p| device.starts_with(p)) {
            continue;
        }
        let (Ok(total), Ok(used), Ok(free)) = (
            fields[1].parse::<u64>(),
            fields[2].parse::<u64>(),
            fields[3].parse::<u64>(),
        ) else {
            continue;
        };
        if total == 0 {
            continue;
        }
        let mount_point = fields[5..].join(" ");
        if volumes
            .iter()
            .any(|v| v.device == device && v.mount_point == mount_point)
        {
            continue;
        }
        volumes.push(DiskVolumeInfo {
            mount_point,
            device: device.to_string(),
            total_bytes: total,
            used_bytes: used,
            free_bytes: free,
        });
    }

    volumes
}

/// Runs the disk command through the remote shell and caches the result per host
pub struct DiskUsage {
    shell: Arc<dyn RemoteShell>,
    ttl: Duration,
    command_timeout: Duration,
    cache: Mutex<HashMap<String, (Instant, Vec<DiskVolumeInfo>)>>,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DiskUsage {
    #[must_use]
    pub fn new(shell: Arc<dyn RemoteShell>, ttl: Duration, command_timeout: Duration) -> Self {
        Self {
            shell,
            ttl,
            command_timeout,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Volumes for a host, probing at most once per TTL
    ///
    /// Concurrent callers for the same host share one command run. A failed
    /// run yields an empty list and is not cached, so the next call retries.
    pub async fn volumes(&self, host: &HostDescriptor) -> Vec<DiskVolumeInfo> {
        if let Some(cached) = self.cached(&host.id) {
            return cached;
        }

        let gate = self.gate(&host.id);
        let _turn = gate.lock().await;
        // whoever held the gate before us may have filled the cache
        if let Some(cached) = self.cached(&host.id) {
            return cached;
        }

        let Some(volumes) = self.run(host).await else {
            return Vec::new();
        };
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.id.clone(), (Instant::now(), volumes.clone()));
        volumes
    }

    async fn run(&self, host: &HostDescriptor) -> Option<Vec<DiskVolumeInfo>> {
        match self
            .shell
            .run_with_timeout(host, DISK_COMMAND, self.command_timeout)
            .await
        {
            // df exits non-zero when one of the paths is missing
            Ok(result) if result.success() || !result.stdout.trim().is_empty() => {
                Some(parse_df_output(&result.stdout))
            }
            Ok(result) => {
                debug!(host = %host.id, status = result.status, "disk command produced no output");
                None
            }
            Err(e) => {
                warn!(host = %host.id, error = %e, "disk command failed");
                None
            }
        }
    }

    fn gate(&self, host_id: &str) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(host_id.to_string())
            .or_default()
            .clone()
    }

    fn cached(&self, host_id: &str) -> Option<Vec<DiskVolumeInfo>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(host_id)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, volumes)| volumes.clone())
    }

    /// Forget the cached volumes for a host
    pub fn invalidate(&self, host_id: &str) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DF: &str = "\
Filesystem       1B-blocks        Used   Available Use% Mounted on
/dev/sda1      99000000000 40000000000 59000000000  41% /
tmpfs            800000000           0   800000000   0% /run
/dev/sdb1     2000000000000 1000000000000 1000000000000  50% /mnt/media disk
/dev/sda1      99000000000 40000000000 59000000000  41% /
overlay        99000000000 40000000000 59000000000  41% /var/lib/docker/overlay2/x/merged
/dev/loop0               0           0           0    - /snap/core
short line
";

    #[test]
    fn test_parse_df_output() {
        let volumes = parse_df_output(DF);
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].device, "/dev/sda1");
        assert_eq!(volumes[0].mount_point, "/");
        assert_eq!(volumes[0].total_bytes, 99_000_000_000);
        assert_eq!(volumes[1].mount_point, "/mnt/media disk");
        assert_eq!(volumes[1].free_bytes, 1_000_000_000_000);
    }

    #[test]
    fn test_parse_df_header_only() {
        assert!(parse_df_output("Filesystem 1B-blocks Used Available Use% Mounted on\n").is_empty());
        assert!(parse_df_output("").is_empty());
    }
}
