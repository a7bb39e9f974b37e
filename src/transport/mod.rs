//! The `transport` module is responsible for network communication with
//! publishers and subscribers.
//!
//! It defines the binary wire format shared by every request and response,
//! the async codec reading and writing it, the per-connection dispatcher and
//! the TCP listener that feeds it.

pub mod codec;
pub mod connection;
pub mod message;
pub mod server;

#[cfg(test)]
mod tests;
