//! The `broker` module holds the relay's shared state and fan-out logic.
//!
//! - `channel`: the subscriber set of a single channel.
//! - `registry`: the fixed array of channels, one lock per channel.
//! - `fanout`: delivery of a received file to every subscriber of a channel.

pub mod channel;
pub mod fanout;
pub mod registry;

pub use fanout::{Broadcaster, DeliveryOutcome};
pub use registry::{Channel, SubscriptionRegistry};
