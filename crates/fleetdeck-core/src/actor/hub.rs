//! `HubActor`: real-time subscriber fan-out
//!
//! The actor is the only owner of the subscriber set, so registration,
//! removal and delivery are serialized through its mailbox without a lock.
//! Every subscriber sits behind a bounded queue: a broadcast only ever
//! `try_send`s, and push subscribers are written by a task of their own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_api::events::WsEvent;
use kameo::actor::{ActorRef, Spawn, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::error::CoreError;
use crate::message::{
    Broadcast, BroadcastReport, RegisterPull, RegisterPush, SubscriberCount, SubscriberId,
    Unregister, Subscription,
};

/// A write to a push subscriber failed
#[derive(Error, Debug, Clone)]
#[error("push failed: {0}")]
pub struct PushError(pub String);

/// A subscriber written to by a dedicated task, such as a socket sink
#[async_trait]
pub trait PushSubscriber: Send {
    /// Deliver one serialized envelope
    async fn push(&mut self, text: &str) -> Result<(), PushError>;
}

/// Arguments for spawning a `HubActor`
#[derive(Debug, Clone, Copy)]
pub struct HubActorArgs {
    /// Upper bound on one push write
    pub push_timeout: Duration,
    /// Envelopes queued per push subscriber
    pub push_queue: usize,
}

impl Default for HubActorArgs {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(5),
            push_queue: 16,
        }
    }
}

/// Actor owning the subscriber set
pub struct HubActor {
    subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<str>>>,
    next_id: SubscriberId,
    push_timeout: Duration,
    push_queue: usize,
}

impl HubActor {
    fn add(&mut self, subscriber: mpsc::Sender<Arc<str>>) -> SubscriberId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(id, subscriber);
        id
    }
}

impl Actor for HubActor {
    type Args = HubActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), "HubActor starting");

        Ok(Self {
            subscribers: HashMap::new(),
            next_id: 1,
            push_timeout: args.push_timeout,
            push_queue: args.push_queue.max(1),
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, subscribers = self.subscribers.len(), "HubActor stopping");
        self.subscribers.clear();
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<RegisterPull> for HubActor {
    type Reply = Subscription;

    async fn handle(
        &mut self,
        msg: RegisterPull,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let (tx, receiver) = mpsc::channel(msg.capacity.max(1));
        let id = self.add(tx);
        debug!(subscriber = id, capacity = msg.capacity, "pull subscriber registered");
        Subscription { id, receiver }
    }
}

impl Message<RegisterPush> for HubActor {
    type Reply = SubscriberId;

    async fn handle(
        &mut self,
        msg: RegisterPush,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let (tx, rx) = mpsc::channel(self.push_queue);
        let id = self.add(tx);
        tokio::spawn(write_loop(id, msg.subscriber, rx, self.push_timeout));
        debug!(subscriber = id, "push subscriber registered");
        id
    }
}

impl Message<Unregister> for HubActor {
    type Reply = bool;

    async fn handle(
        &mut self,
        msg: Unregister,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let removed = self.subscribers.remove(&msg.id).is_some();
        if removed {
            debug!(subscriber = msg.id, "subscriber unregistered");
        }
        removed
    }
}

impl Message<Broadcast> for HubActor {
    type Reply = BroadcastReport;

    async fn handle(
        &mut self,
        msg: Broadcast,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let mut report = BroadcastReport::default();

        let text: Arc<str> = match serde_json::to_string(&msg.event) {
            Ok(text) => text.into(),
            Err(e) => {
                error!(kind = msg.event.kind(), error = %e, "failed to serialize event");
                return report;
            }
        };

        let mut dead = Vec::new();

        for (id, tx) in &self.subscribers {
            match tx.try_send(text.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => report.dropped += 1,
                Err(TrySendError::Closed(_)) => dead.push(*id),
            }
        }

        for id in dead {
            self.subscribers.remove(&id);
            report.removed += 1;
        }

        report
    }
}

impl Message<SubscriberCount> for HubActor {
    type Reply = usize;

    async fn handle(
        &mut self,
        _msg: SubscriberCount,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.subscribers.len()
    }
}

/// Drain one push subscriber's queue
///
/// Ends on the first failed or timed-out write, which closes the queue; the
/// hub drops the subscriber on its next broadcast.
async fn write_loop(
    id: SubscriberId,
    mut sink: Box<dyn PushSubscriber>,
    mut queue: mpsc::Receiver<Arc<str>>,
    push_timeout: Duration,
) {
    while let Some(text) = queue.recv().await {
        match timeout(push_timeout, sink.push(&text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(subscriber = id, error = %e, "push subscriber failed");
                return;
            }
            Err(_) => {
                debug!(subscriber = id, "push subscriber timed out");
                return;
            }
        }
    }
    debug!(subscriber = id, "push subscriber released");
}

/// Cloneable front for the hub actor
#[derive(Clone)]
pub struct HubHandle {
    actor: ActorRef<HubActor>,
}

impl HubHandle {
    /// Spawn a hub actor
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(args: HubActorArgs) -> Self {
        Self {
            actor: HubActor::spawn(args),
        }
    }

    /// Register a pull subscriber with a bounded buffer
    ///
    /// # Errors
    /// Returns `CoreError::ActorError` if the hub is not running
    pub async fn subscribe(&self, capacity: usize) -> Result<Subscription, CoreError> {
        self.actor
            .ask(RegisterPull { capacity })
            .await
            .map_err(|e| CoreError::ActorError(e.to_string()))
    }

    /// Register a push subscriber
    ///
    /// # Errors
    /// Returns `CoreError::ActorError` if the hub is not running
    pub async fn register_push(
        &self,
        subscriber: Box<dyn PushSubscriber>,
    ) -> Result<SubscriberId, CoreError> {
        self.actor
            .ask(RegisterPush { subscriber })
            .await
            .map_err(|e| CoreError::ActorError(e.to_string()))
    }

    /// Remove a subscriber, returning whether it was registered
    ///
    /// # Errors
    /// Returns `CoreError::ActorError` if the hub is not running
    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<bool, CoreError> {
        self.actor
            .ask(Unregister { id })
            .await
            .map_err(|e| CoreError::ActorError(e.to_string()))
    }

    /// Deliver an event to every subscriber
    ///
    /// # Errors
    /// Returns `CoreError::ActorError` if the hub is not running
    pub async fn publish(&self, event: WsEvent) -> Result<BroadcastReport, CoreError> {
        self.actor
            .ask(Broadcast { event })
            .await
            .map_err(|e| CoreError::ActorError(e.to_string()))
    }

    /// Number of registered subscribers
    ///
    /// # Errors
    /// Returns `CoreError::ActorError` if the hub is not running
    pub async fn subscriber_count(&self) -> Result<usize, CoreError> {
        self.actor
            .ask(SubscriberCount)
            .await
            .map_err(|e| CoreError::ActorError(e.to_string()))
    }

    /// Stop the hub, dropping every subscriber
    pub async fn stop(&self) {
        self.actor.stop_gracefully().await.ok();
    }
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("actor", &self.actor.id())
            .finish()
    }
}
