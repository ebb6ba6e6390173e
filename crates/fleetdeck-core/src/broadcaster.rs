//! Periodic fleet snapshot broadcaster

use std::time::Duration;

use fleetdeck_api::events::WsEvent;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, instrument, warn};

use crate::actor::hub::HubHandle;
use crate::aggregator::Aggregator;
use crate::config::BroadcasterConfig;
use crate::error::CoreError;

/// Start the broadcast loop
///
/// Each tick runs under the tick deadline; ticks that fall behind are
/// skipped rather than queued.
pub fn spawn_broadcaster(
    aggregator: Aggregator,
    hub: HubHandle,
    config: BroadcasterConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // listing and host stats each get half of the tick
        let phase_deadline = config.tick_deadline / 2;

        loop {
            ticker.tick().await;
            match timeout(
                config.tick_deadline,
                run_tick(&aggregator, &hub, phase_deadline),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "broadcast tick failed, hub unavailable");
                    break;
                }
                Err(_) => warn!(deadline = ?config.tick_deadline, "broadcast tick exceeded deadline"),
            }
        }
    })
}

/// One broadcast pass: containers, then container and host stats
///
/// # Errors
/// Returns an error only if the hub cannot be reached
#[instrument(skip(aggregator, hub))]
pub async fn run_tick(
    aggregator: &Aggregator,
    hub: &HubHandle,
    phase_deadline: Duration,
) -> Result<(), CoreError> {
    let containers = aggregator.list_all_containers(phase_deadline).await;
    let report = hub.publish(WsEvent::Containers(containers.clone())).await?;
    debug!(
        containers = containers.len(),
        delivered = report.delivered,
        dropped = report.dropped,
        removed = report.removed,
        "containers broadcast"
    );

    let (stats, hosts) = tokio::join!(
        aggregator.stats_for_containers(&containers),
        aggregator.host_stats(phase_deadline)
    );
    hub.publish(WsEvent::Stats(stats)).await?;
    hub.publish(WsEvent::Hosts(hosts)).await?;
    Ok(())
}
