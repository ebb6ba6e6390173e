//! Resource figures derived from raw engine samples

use fleetdeck_api::models::ContainerStatsSnapshot;
use fleetdeck_engine::RawStatsSample;

/// CPU usage since the previous sample, as a percentage of one core
///
/// Zero unless both the container and system counters advanced. The core
/// count falls back from the sample's online count to its per-CPU array,
/// then to the host's count, then to 1.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cpu_percent(sample: &RawStatsSample, host_cpus: u64) -> f64 {
    let cpu_delta = i128::from(sample.cpu_total) - i128::from(sample.precpu_total);
    let system_delta = match (sample.system_cpu, sample.presystem_cpu) {
        (Some(now), Some(before)) => i128::from(now) - i128::from(before),
        _ => 0,
    };
    if cpu_delta <= 0 || system_delta <= 0 {
        return 0.0;
    }

    let cpus = sample
        .online_cpus
        .filter(|&n| n > 0)
        .or_else(|| u64::try_from(sample.percpu_count).ok().filter(|&n| n > 0))
        .or(Some(host_cpus).filter(|&n| n > 0))
        .unwrap_or(1);

    (cpu_delta as f64 / system_delta as f64) * cpus as f64 * 100.0
}

/// Memory usage as a percentage of the limit, zero without a limit
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn memory_percent(usage: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    usage as f64 / limit as f64 * 100.0
}

/// Build the published stats record for one container
#[must_use]
pub fn container_stats_snapshot(
    host_id: &str,
    id: &str,
    name: &str,
    sample: &RawStatsSample,
    host_cpus: u64,
) -> ContainerStatsSnapshot {
    let memory_usage = sample.memory_usage.unwrap_or(0);
    let memory_limit = sample.memory_limit.unwrap_or(0);

    let (network_rx, network_tx) = sample.networks.iter().fold((0u64, 0u64), |(rx, tx), n| {
        (rx.saturating_add(n.rx_bytes), tx.saturating_add(n.tx_bytes))
    });

    let mut block_read = 0u64;
    let mut block_write = 0u64;
    for entry in &sample.blkio {
        if entry.op.eq_ignore_ascii_case("read") {
            block_read = block_read.saturating_add(entry.value);
        } else if entry.op.eq_ignore_ascii_case("write") {
            block_write = block_write.saturating_add(entry.value);
        }
    }

    ContainerStatsSnapshot {
        id: id.to_string(),
        name: name.to_string(),
        host_id: host_id.to_string(),
        cpu_percent: cpu_percent(sample, host_cpus),
        memory_usage,
        memory_limit,
        memory_percent: memory_percent(memory_usage, memory_limit),
        network_rx,
        network_tx,
        block_read,
        block_write,
    }
}

#[cfg(test)]
mod tests {
    use fleetdeck_engine::{BlkioEntry, NetworkCounters};

    use super::*;

    fn sample(cpu: (u64, u64), system: (Option<u64>, Option<u64>)) -> RawStatsSample {
        RawStatsSample {
            cpu_total: cpu.0,
            precpu_total: cpu.1,
            system_cpu: system.0,
            presystem_cpu: system.1,
            online_cpus: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_cpu_percent() {
        let s = sample((200, 100), (Some(2_000), Some(1_000)));
        assert!((cpu_percent(&s, 8) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_percent_never_negative() {
        // counters reset after a container restart
        let s = sample((100, 200), (Some(2_000), Some(1_000)));
        assert!(cpu_percent(&s, 4).abs() < f64::EPSILON);

        let s = sample((200, 100), (Some(1_000), Some(1_000)));
        assert!(cpu_percent(&s, 4).abs() < f64::EPSILON);

        let s = sample((200, 100), (Some(1_000), None));
        assert!(cpu_percent(&s, 4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cpu_count_fallbacks() {
        let mut s = sample((200, 100), (Some(1_100), Some(1_000)));
        s.online_cpus = None;
        s.percpu_count = 4;
        assert!((cpu_percent(&s, 8) - 400.0).abs() < 1e-9);

        s.percpu_count = 0;
        assert!((cpu_percent(&s, 8) - 800.0).abs() < 1e-9);
        assert!((cpu_percent(&s, 0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_sums_counters() {
        let s = RawStatsSample {
            memory_usage: Some(256),
            memory_limit: Some(1024),
            networks: vec![
                NetworkCounters {
                    rx_bytes: 10,
                    tx_bytes: 1,
                },
                NetworkCounters {
                    rx_bytes: 5,
                    tx_bytes: 2,
                },
            ],
            blkio: vec![
                BlkioEntry {
                    op: "Read".into(),
                    value: 100,
                },
                BlkioEntry {
                    op: "write".into(),
                    value: 40,
                },
                BlkioEntry {
                    op: "Sync".into(),
                    value: 999,
                },
            ],
            ..Default::default()
        };
        let stats = container_stats_snapshot("nas", "abc", "web", &s, 4);
        assert_eq!((stats.network_rx, stats.network_tx), (15, 3));
        assert_eq!((stats.block_read, stats.block_write), (100, 40));
        assert!((stats.memory_percent - 25.0).abs() < 1e-9);
        assert!(stats.cpu_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_percent_without_limit() {
        assert!(memory_percent(512, 0).abs() < f64::EPSILON);
    }
}
