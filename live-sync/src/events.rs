//! Channel events.
//!
//! Everything a poller or channel set reports beyond the record state itself
//! is published here: liveness transitions, refreshes and fetch failures.
//! Fetch errors never leave their poller any other way.

use chrono::{DateTime, Utc};
use platforms_api::FetchError;
use tokio::sync::broadcast;

use crate::channel::LiveState;
use crate::service::SortPolicy;

/// Events emitted by channel sets and their pollers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A channel was added to a service.
    ChannelAdded {
        service: String,
        channel: String,
        timestamp: DateTime<Utc>,
    },
    /// A channel was removed and its poller cancelled.
    ChannelRemoved {
        service: String,
        channel: String,
        timestamp: DateTime<Utc>,
    },
    /// A refresh was merged into the record.
    StateChanged {
        service: String,
        channel: String,
        state: LiveState,
        timestamp: DateTime<Utc>,
    },
    /// Channel went from offline to live.
    WentLive {
        service: String,
        channel: String,
        title: String,
        game: String,
        viewer_count: u64,
        timestamp: DateTime<Utc>,
    },
    /// Channel went from live to offline.
    WentOffline {
        service: String,
        channel: String,
        timestamp: DateTime<Utc>,
    },
    /// A refresh failed; the record keeps its last known state.
    FetchFailed {
        service: String,
        channel: String,
        error: FetchError,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },
    /// Ordering policy of a service changed.
    SortPolicyChanged {
        service: String,
        policy: SortPolicy,
        timestamp: DateTime<Utc>,
    },
}

impl ChannelEvent {
    /// Channel the event is about, if any.
    pub fn channel(&self) -> Option<&str> {
        match self {
            ChannelEvent::ChannelAdded { channel, .. }
            | ChannelEvent::ChannelRemoved { channel, .. }
            | ChannelEvent::StateChanged { channel, .. }
            | ChannelEvent::WentLive { channel, .. }
            | ChannelEvent::WentOffline { channel, .. }
            | ChannelEvent::FetchFailed { channel, .. } => Some(channel),
            ChannelEvent::SortPolicyChanged { .. } => None,
        }
    }

    pub fn service(&self) -> &str {
        match self {
            ChannelEvent::ChannelAdded { service, .. }
            | ChannelEvent::ChannelRemoved { service, .. }
            | ChannelEvent::StateChanged { service, .. }
            | ChannelEvent::WentLive { service, .. }
            | ChannelEvent::WentOffline { service, .. }
            | ChannelEvent::FetchFailed { service, .. }
            | ChannelEvent::SortPolicyChanged { service, .. } => service,
        }
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            ChannelEvent::ChannelAdded { channel, service, .. } => {
                format!("{} added to {}", channel, service)
            }
            ChannelEvent::ChannelRemoved { channel, service, .. } => {
                format!("{} removed from {}", channel, service)
            }
            ChannelEvent::StateChanged { channel, state, .. } => {
                format!("{} refreshed: {}", channel, state)
            }
            ChannelEvent::WentLive {
                channel,
                title,
                viewer_count,
                ..
            } => {
                format!("{} is now live: {} ({} viewers)", channel, title, viewer_count)
            }
            ChannelEvent::WentOffline { channel, .. } => {
                format!("{} went offline", channel)
            }
            ChannelEvent::FetchFailed {
                channel,
                error,
                consecutive_failures,
                ..
            } => {
                format!(
                    "{}: {} (attempt {})",
                    channel, error, consecutive_failures
                )
            }
            ChannelEvent::SortPolicyChanged {
                service, policy, ..
            } => {
                format!("{} now sorted by {}", service, policy)
            }
        }
    }
}

/// Broadcaster for channel events.
pub struct ChannelEventBroadcaster {
    sender: broadcast::Sender<ChannelEvent>,
}

impl ChannelEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to channel events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning the number of subscribers that received it.
    pub fn publish(&self, event: ChannelEvent) -> usize {
        // No subscribers is not an error for fire-and-forget events
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChannelEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ChannelEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
