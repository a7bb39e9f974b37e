//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `filecast` application.
//!
//! It centralizes the error types shared by the codec, the dispatcher, the
//! broadcaster and the client helpers, plus the logging bootstrap.

pub mod error;
pub mod logging;
