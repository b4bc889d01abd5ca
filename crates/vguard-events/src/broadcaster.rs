//! Per-owner channel registry.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};
use vguard_models::ProgressEvent;

/// Default per-listener buffer.
pub const DEFAULT_LISTENER_BUFFER: usize = 64;

/// Metric name constants for consistency.
pub mod names {
    pub const ACTIVE_LISTENERS: &str = "vguard_event_listeners_active";
    pub const EVENTS_DELIVERED_TOTAL: &str = "vguard_events_delivered_total";
    pub const EVENTS_DROPPED_TOTAL: &str = "vguard_events_dropped_total";
}

/// Logical delivery scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Events about videos owned by this user
    Owner(String),
    /// Events about every video
    Admins,
}

impl Channel {
    pub fn owner(user_id: impl Into<String>) -> Self {
        Self::Owner(user_id.into())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Owner(id) => write!(f, "owner:{}", id),
            Channel::Admins => write!(f, "admins"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving side of a registered listener.
#[derive(Debug)]
pub struct ListenerHandle {
    pub id: ListenerId,
    pub receiver: mpsc::Receiver<ProgressEvent>,
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Listener buffer was full
    pub dropped: usize,
    /// Listener had disconnected and was removed
    pub closed: usize,
}

/// Concurrent registry of listeners and the channels they joined.
///
/// Safe to share across connection handlers and processing runs; publish,
/// join and leave may all run concurrently.
#[derive(Debug)]
pub struct ProgressBroadcaster {
    listeners: DashMap<ListenerId, mpsc::Sender<ProgressEvent>>,
    channels: DashMap<Channel, HashSet<ListenerId>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER_BUFFER)
    }
}

impl ProgressBroadcaster {
    /// Create a broadcaster whose listeners buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            listeners: DashMap::new(),
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a new listener. It receives nothing until it joins a channel.
    pub fn register(&self) -> ListenerHandle {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.listeners.insert(id, sender);
        gauge!(names::ACTIVE_LISTENERS).set(self.listeners.len() as f64);
        debug!(listener = %id, "Registered listener");
        ListenerHandle { id, receiver }
    }

    /// Join `channel`. Returns false if the listener is not registered.
    pub fn join(&self, id: ListenerId, channel: Channel) -> bool {
        if !self.listeners.contains_key(&id) {
            return false;
        }
        debug!(listener = %id, channel = %channel, "Listener joined");
        self.channels.entry(channel).or_default().insert(id);
        true
    }

    /// Leave `channel`. Returns whether the listener was a member.
    pub fn leave(&self, id: ListenerId, channel: &Channel) -> bool {
        let removed = self
            .channels
            .get_mut(channel)
            .map(|mut members| members.remove(&id))
            .unwrap_or(false);
        self.channels.remove_if(channel, |_, members| members.is_empty());
        removed
    }

    /// Drop a listener and all of its memberships.
    pub fn remove_listener(&self, id: ListenerId) {
        if self.listeners.remove(&id).is_none() {
            return;
        }
        self.channels.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
        gauge!(names::ACTIVE_LISTENERS).set(self.listeners.len() as f64);
        debug!(listener = %id, "Removed listener");
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of listeners joined to `channel`.
    pub fn members(&self, channel: &Channel) -> usize {
        self.channels.get(channel).map(|m| m.len()).unwrap_or(0)
    }

    /// Deliver `event` to the owner's channel and the admin channel.
    ///
    /// Best effort: never blocks, never persists. A listener present in
    /// both channels gets the event once.
    pub fn publish(&self, owner_id: &str, event: &ProgressEvent) -> PublishReport {
        let mut targets = BTreeSet::new();
        for channel in [Channel::owner(owner_id), Channel::Admins] {
            if let Some(members) = self.channels.get(&channel) {
                targets.extend(members.iter().copied());
            }
        }

        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        for id in targets {
            let Some(sender) = self.listeners.get(&id).map(|s| s.clone()) else {
                continue;
            };
            match sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(listener = %id, "Listener buffer full, dropping event");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        report.closed = closed.len();
        for id in closed {
            self.remove_listener(id);
        }

        counter!(names::EVENTS_DELIVERED_TOTAL).increment(report.delivered as u64);
        if report.dropped > 0 {
            counter!(names::EVENTS_DROPPED_TOTAL).increment(report.dropped as u64);
        }
        report
    }
}
