//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use std::fmt;
use std::sync::Arc;

use fleetdeck_api::events::WsEvent;
use kameo_macros::Reply;
use tokio::sync::mpsc;

use crate::actor::hub::PushSubscriber;

/// Identifier handed out on registration
pub type SubscriberId = u64;

// ============================================================================
// HubActor Messages
// ============================================================================

/// Register a subscriber that drains a bounded channel
#[derive(Debug)]
pub struct RegisterPull {
    /// Channel capacity; messages are dropped for this subscriber when full
    pub capacity: usize,
}

/// A pull subscription
#[derive(Debug, Reply)]
pub struct Subscription {
    /// Id to pass to `Unregister`
    pub id: SubscriberId,
    /// Serialized envelopes
    pub receiver: mpsc::Receiver<Arc<str>>,
}

/// Register a subscriber written to by its own task
pub struct RegisterPush {
    pub subscriber: Box<dyn PushSubscriber>,
}

impl fmt::Debug for RegisterPush {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterPush").finish_non_exhaustive()
    }
}

/// Remove a subscriber
#[derive(Debug)]
pub struct Unregister {
    pub id: SubscriberId,
}

/// Deliver one envelope to every subscriber
#[derive(Debug)]
pub struct Broadcast {
    pub event: WsEvent,
}

/// Delivery counts for one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Reply)]
pub struct BroadcastReport {
    /// Subscribers that accepted the envelope into their buffer
    pub delivered: usize,
    /// Subscribers whose buffer was full
    pub dropped: usize,
    /// Subscribers removed because they were closed or failed
    pub removed: usize,
}

/// Count registered subscribers
#[derive(Debug)]
pub struct SubscriberCount;
