//! The `error` module defines custom error types used within the `filecast` application.
//!
//! Each layer owns one enum: the wire codec (`ProtocolError`), the connection
//! dispatcher (`RequestError`), the fan-out broadcaster (`DeliveryError`), the
//! client helpers (`ClientError`) and the listener (`ServerError`).

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::transport::connection::HandleStatus;

/// Failures of the wire codec while reading or framing a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed before a complete field was read")]
    ShortRead,

    #[error("connection closed after {received} of {expected} body bytes")]
    IncompleteBody { expected: u64, received: u64 },

    #[error("filename is {len} bytes, the field holds at most {max}")]
    FilenameTooLong { len: usize, max: usize },

    #[error("filename contains a null byte")]
    FilenameContainsNull,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Map an I/O error from an exact read, turning a premature EOF into `ShortRead`.
    pub fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::ShortRead
        } else {
            ProtocolError::Io(err)
        }
    }
}

/// Reasons an inbound request is refused.
///
/// Every variant carries the text sent back to the peer in a notify-failure
/// message and the status the dispatcher reports for the connection.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read command: {0}")]
    CommandRead(#[source] ProtocolError),

    #[error("invalid command {0}")]
    InvalidCommand(u8),

    #[error("failed to read channel: {0}")]
    ChannelRead(#[source] ProtocolError),

    #[error("failed to read content length: {0}")]
    LengthRead(#[source] ProtocolError),

    #[error("failed to read filename: {0}")]
    FilenameRead(#[source] ProtocolError),

    #[error("invalid channel {0}")]
    InvalidChannel(u8),

    #[error("invalid content length {0}")]
    InvalidContentLength(u64),

    #[error("empty filename")]
    EmptyFilename,

    #[error("subscriber address is not valid UTF-8")]
    InvalidAddress,

    #[error("failed to read subscriber address: {0}")]
    ContentIncompleteRead(#[source] ProtocolError),

    #[error("failed to read file content: {0}")]
    FileIncompleteRead(#[source] ProtocolError),
}

impl RequestError {
    /// Text returned to the peer inside the notify-failure body.
    pub fn notice(&self) -> &'static str {
        match self {
            RequestError::CommandRead(_) => "command read error",
            RequestError::InvalidCommand(_) => "invalid command",
            RequestError::ChannelRead(_) => "channel read error",
            RequestError::LengthRead(_) => "length read error",
            RequestError::FilenameRead(_) => "filename read error",
            RequestError::InvalidChannel(_) => "invalid channel",
            RequestError::InvalidContentLength(_) => "invalid content length",
            RequestError::EmptyFilename => "empty filename",
            RequestError::InvalidAddress => "invalid address",
            RequestError::ContentIncompleteRead(_) => "content incomplete read",
            RequestError::FileIncompleteRead(_) => "file incomplete read",
        }
    }

    /// Status reported for the connection that produced this error.
    pub fn status(&self) -> HandleStatus {
        match self {
            RequestError::CommandRead(_) => HandleStatus::ConnectionError,
            RequestError::InvalidCommand(_) => HandleStatus::Rejected,
            RequestError::ChannelRead(_)
            | RequestError::LengthRead(_)
            | RequestError::FilenameRead(_)
            | RequestError::ContentIncompleteRead(_)
            | RequestError::FileIncompleteRead(_) => HandleStatus::IoError,
            RequestError::InvalidChannel(_)
            | RequestError::InvalidContentLength(_)
            | RequestError::EmptyFilename
            | RequestError::InvalidAddress => HandleStatus::ValidationError,
        }
    }
}

/// Failure of a single delivery attempt to one subscriber.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("could not connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write delivery: {0}")]
    Write(#[source] io::Error),

    #[error("failed to read subscriber response: {0}")]
    Response(#[source] ProtocolError),

    #[error("delivery did not complete within {0:?}")]
    TimedOut(Duration),
}

/// Errors surfaced by the protocol client helpers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server refused the request: {0}")]
    Refused(String),

    #[error("unexpected command {0} in response")]
    UnexpectedResponse(u8),

    #[error("delivery body of {len} bytes is shorter than the {width}-byte filename field")]
    MalformedDelivery { len: usize, width: usize },
}

/// Errors that stop the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}
