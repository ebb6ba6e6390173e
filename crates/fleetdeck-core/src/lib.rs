//! fleetdeck-core: Fleet aggregation and control
//!
//! Fans queries out to every host's container engine and merges the
//! results, routes lifecycle actions and terminals over the engine API or
//! the remote shell, runs validated image updates and feeds real-time
//! subscribers through the `HubActor`.

pub mod actor;
pub mod aggregator;
pub mod broadcaster;
pub mod config;
pub mod disk;
pub mod error;
pub mod fleet;
pub mod health;
pub mod lifecycle;
pub mod message;
pub mod notify;
pub mod pool;
pub mod registry;
pub mod routing;
pub mod stats;
pub mod update;
pub mod update_check;

pub use actor::hub::{HubActor, HubActorArgs, HubHandle, PushError, PushSubscriber};
pub use aggregator::Aggregator;
pub use broadcaster::{run_tick, spawn_broadcaster};
pub use config::{
    AggregatorTimeouts, BroadcasterConfig, FleetSettings, ResourceThresholds, UpdateSchedule,
};
pub use disk::DiskUsage;
pub use error::CoreError;
pub use fleet::{BackgroundTasks, Fleet, FleetDeps};
pub use health::HealthTracker;
pub use lifecycle::{LifecycleTracker, StateChange, Transition};
pub use message::{
    Broadcast, BroadcastReport, RegisterPull, RegisterPush, SubscriberCount, SubscriberId,
    Subscription, Unregister,
};
pub use notify::{LogNotifier, NoopNotifier, Notifier};
pub use pool::ConnectionPool;
pub use registry::{HostRegistry, parse_hosts_spec};
pub use routing::{Attempt, ContainerController, Route};
pub use update::{UpdateEngine, UpdateError, UpdateOutcome, UpdatePolicy, UpdateStep, UpdateTask};
pub use update_check::UpdateChecker;
