//! Wire message definitions
//!
//! Every exchange, inbound or outbound, uses the same fixed header followed by
//! a body whose length the header declares:
//!
//! ```text
//! +-------------+-------------+-------------------+-------------+
//! | command (1) | channel (1) | length (8, LE u64)| body        |
//! +-------------+-------------+-------------------+-------------+
//! ```
//!
//! Channel `0` only appears in generic failure notifications.

use bytes::{BufMut, Bytes, BytesMut};

use crate::utils::error::ProtocolError;

/// Size of the fixed header preceding every body.
pub const HEADER_LEN: usize = 10;

/// Channel used by notifications that are not tied to a channel.
pub const NO_CHANNEL: u8 = 0;

/// Command tag carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Subscribe = 0,
    Send = 1,
    NotifySuccess = 2,
    NotifyFailure = 3,
    Unsubscribe = 4,
}

impl Command {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Command::Subscribe),
            1 => Ok(Command::Send),
            2 => Ok(Command::NotifySuccess),
            3 => Ok(Command::NotifyFailure),
            4 => Ok(Command::Unsubscribe),
            other => Err(other),
        }
    }
}

/// Decoded fixed header.
///
/// `command` stays a raw byte: the receiver decides which values are
/// acceptable in its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command: u8,
    pub channel: u8,
    pub length: u64,
}

impl Header {
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Self {
        let mut length = [0u8; 8];
        length.copy_from_slice(&buf[2..]);
        Self {
            command: buf[0],
            channel: buf[1],
            length: u64::from_le_bytes(length),
        }
    }
}

/// A complete message, header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: u8,
    pub channel: u8,
    pub body: Bytes,
}

impl Message {
    pub fn new(command: Command, channel: u8, body: impl Into<Bytes>) -> Self {
        Self {
            command: command.as_u8(),
            channel,
            body: body.into(),
        }
    }

    /// Text of the body, lossily decoded. Notifications carry human-readable text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn encode(&self) -> Bytes {
        encode_raw(self.command, self.channel, &self.body)
    }
}

/// Frame `body` behind a header. Always returns `HEADER_LEN + body.len()` bytes.
pub fn encode(command: Command, channel: u8, body: &[u8]) -> Bytes {
    encode_raw(command.as_u8(), channel, body)
}

fn encode_raw(command: u8, channel: u8, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_u8(command);
    buf.put_u8(channel);
    buf.put_u64_le(body.len() as u64);
    buf.put_slice(body);
    buf.freeze()
}

/// Frame a `Send` message whose body is the filename field followed by the content.
pub fn encode_file(channel: u8, filename_field: &[u8], content: &[u8]) -> Bytes {
    let length = filename_field.len() + content.len();
    let mut buf = BytesMut::with_capacity(HEADER_LEN + length);
    buf.put_u8(Command::Send.as_u8());
    buf.put_u8(channel);
    buf.put_u64_le(length as u64);
    buf.put_slice(filename_field);
    buf.put_slice(content);
    buf.freeze()
}

/// Build the fixed-width, null-padded filename field.
pub fn encode_filename(name: &str, width: usize) -> Result<Bytes, ProtocolError> {
    let raw = name.as_bytes();
    if raw.contains(&0) {
        return Err(ProtocolError::FilenameContainsNull);
    }
    if raw.len() > width {
        return Err(ProtocolError::FilenameTooLong {
            len: raw.len(),
            max: width,
        });
    }
    let mut field = BytesMut::zeroed(width);
    field[..raw.len()].copy_from_slice(raw);
    Ok(field.freeze())
}

/// Filename held in a filename field: everything before the first null byte.
pub fn parse_filename(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
