//! Progress event delivery.
//!
//! Connected clients register a listener, then join one or more channels.
//! Events for a video are published to its owner's channel and to the
//! admin channel; every listener joined to either receives them, at most
//! once, in publish order.

pub mod broadcaster;

pub use broadcaster::{Channel, ListenerHandle, ListenerId, ProgressBroadcaster, PublishReport};
