//! Actor implementations

pub mod hub;

pub use hub::{HubActor, HubActorArgs, HubHandle, PushError, PushSubscriber};
