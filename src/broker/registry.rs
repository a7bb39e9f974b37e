//! Subscription registry
//!
//! The registry owns one subscriber set per channel, each behind its own
//! `Mutex`, so traffic on different channels never contends. It is created
//! once at startup and shared (`Arc<SubscriptionRegistry>`) between the
//! listener and every connection task.
//!
//! Concurrency and usage notes:
//! - Locks are held only while the in-memory map is mutated or copied; no
//!   method awaits while holding one.
//! - `snapshot` hands out an owned copy. Broadcasts iterate that copy while
//!   doing network I/O, so registrations made after the snapshot are not
//!   seen by an in-flight broadcast.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::broker::channel::{ChannelSubscriptions, SubscriberAddress, Subscription};

/// A channel number validated against the registry it came from.
///
/// Only `SubscriptionRegistry::channel` creates one, so the value is always
/// in `1..=number_of_channels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    pub fn get(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct SubscriptionRegistry {
    channels: Vec<Mutex<ChannelSubscriptions>>,
}

impl SubscriptionRegistry {
    /// Create a registry with `number_of_channels` empty channels (numbered from 1).
    pub fn new(number_of_channels: u8) -> Self {
        let channels = (0..number_of_channels)
            .map(|_| Mutex::new(ChannelSubscriptions::new()))
            .collect();
        Self { channels }
    }

    pub fn number_of_channels(&self) -> u8 {
        self.channels.len() as u8
    }

    /// Validate a raw channel byte. Returns `None` for 0 and anything above the channel count.
    pub fn channel(&self, raw: u8) -> Option<Channel> {
        if raw >= 1 && usize::from(raw) <= self.channels.len() {
            Some(Channel(raw))
        } else {
            None
        }
    }

    /// Subscribe `address` to `channel`, refreshing the timestamp if it is already there.
    pub fn register(&self, address: impl Into<SubscriberAddress>, channel: Channel) {
        let address = address.into();
        if let Some(mut subscribers) = self.lock(channel) {
            subscribers.subscribe(address.clone());
            debug!(%channel, %address, subscribers = subscribers.len(), "Subscriber registered");
        }
    }

    /// Remove `address` from `channel`. Absent addresses are ignored.
    pub fn unregister(&self, address: &str, channel: Channel) {
        if let Some(mut subscribers) = self.lock(channel) {
            let removed = subscribers.unsubscribe(address);
            debug!(%channel, %address, removed, "Subscriber unregistered");
        }
    }

    /// Owned copy of the channel's subscriber addresses, oldest registration first.
    pub fn snapshot(&self, channel: Channel) -> Vec<SubscriberAddress> {
        self.lock(channel)
            .map(|subscribers| subscribers.addresses())
            .unwrap_or_default()
    }

    /// Registrations with their timestamps, for diagnostics.
    pub fn subscriptions(&self, channel: Channel) -> Vec<Subscription> {
        self.lock(channel)
            .map(|subscribers| subscribers.subscriptions())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.lock(channel)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    // A `Channel` minted by a registry with more channels is treated as unknown.
    fn lock(&self, channel: Channel) -> Option<MutexGuard<'_, ChannelSubscriptions>> {
        self.channels
            .get(channel.index())
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
