//! The `client` module speaks the relay protocol from the other side.
//!
//! `RelayClient` issues subscribe, unsubscribe and send requests against a
//! running server. `SubscriberListener` is the callback endpoint a subscriber
//! registers: it accepts pushed deliveries and acknowledges them.

pub mod publisher;
pub mod subscriber;

pub use publisher::RelayClient;
pub use subscriber::{Delivery, SubscriberListener};
