//! # filecast
//!
//! `filecast` is a broadcast file relay. Subscribers register a callback
//! address on one of a fixed set of numbered channels; any client may push a
//! file to a channel and the relay forwards it to every current subscriber
//! over a fresh outbound connection. Files are never stored.
//!
//! ## Core Modules
//!
//! - `broker`: the subscription registry and the fan-out broadcaster.
//! - `client`: publisher and subscriber helpers speaking the relay protocol.
//! - `config`: loading and validating server configuration.
//! - `transport`: the wire format, the connection dispatcher and the TCP listener.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
