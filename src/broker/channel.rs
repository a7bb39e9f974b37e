//! Per-channel subscriber set
//!
//! A `ChannelSubscriptions` holds the callback addresses registered on one
//! channel, keyed by address so a repeated subscribe only refreshes the
//! registration time.
//!
//! Concurrency note: callers must synchronize access (the registry wraps each
//! set in its own lock).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Callback address at which a subscriber accepts pushed deliveries (`host:port`).
pub type SubscriberAddress = String;

/// One registration, as reported by `SubscriptionRegistry::subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub address: SubscriberAddress,
    pub subscribed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ChannelSubscriptions {
    subscribers: HashMap<SubscriberAddress, DateTime<Utc>>,
}

impl ChannelSubscriptions {
    pub fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }

    /// Add a subscriber, or refresh its timestamp if already present.
    pub fn subscribe(&mut self, address: SubscriberAddress) {
        self.subscribers.insert(address, Utc::now());
    }

    /// Remove a subscriber. Returns whether it was present.
    pub fn unsubscribe(&mut self, address: &str) -> bool {
        self.subscribers.remove(address).is_some()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.subscribers.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Registrations ordered by subscription time, ties broken by address.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut subscriptions: Vec<Subscription> = self
            .subscribers
            .iter()
            .map(|(address, subscribed_at)| Subscription {
                address: address.clone(),
                subscribed_at: *subscribed_at,
            })
            .collect();
        subscriptions.sort_by(|a, b| {
            a.subscribed_at
                .cmp(&b.subscribed_at)
                .then_with(|| a.address.cmp(&b.address))
        });
        subscriptions
    }

    /// Owned copy of the addresses, in `subscriptions()` order.
    pub fn addresses(&self) -> Vec<SubscriberAddress> {
        self.subscriptions()
            .into_iter()
            .map(|subscription| subscription.address)
            .collect()
    }
}
