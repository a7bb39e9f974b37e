use tokio::net::TcpStream;
use tracing::debug;

use crate::transport::codec;
use crate::transport::message::{self, Command, Message};
use crate::utils::error::ClientError;

const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Issues one-shot requests against a relay server.
///
/// Every request opens its own connection, writes one message and reads the
/// server's single notification before the connection is dropped.
#[derive(Debug, Clone)]
pub struct RelayClient {
    server: String,
    chunk_size: usize,
}

impl RelayClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Register `callback` (a `host:port` the caller listens on) for `channel`.
    pub async fn subscribe(&self, channel: u8, callback: &str) -> Result<Message, ClientError> {
        let frame = message::encode(Command::Subscribe, channel, callback.as_bytes());
        self.expect_success(&frame).await
    }

    pub async fn unsubscribe(&self, channel: u8, callback: &str) -> Result<Message, ClientError> {
        let frame = message::encode(Command::Unsubscribe, channel, callback.as_bytes());
        self.expect_success(&frame).await
    }

    /// Push a file to every subscriber of `channel`.
    ///
    /// `filename_width` must match the server's configured filename field width.
    pub async fn send_file(
        &self,
        channel: u8,
        filename: &str,
        content: &[u8],
        filename_width: usize,
    ) -> Result<Message, ClientError> {
        let field = message::encode_filename(filename, filename_width)?;
        let frame = message::encode_file(channel, &field, content);
        self.expect_success(&frame).await
    }

    /// Write an arbitrary, already framed request and return whatever the server answers.
    pub async fn request(&self, frame: &[u8]) -> Result<Message, ClientError> {
        let mut stream = TcpStream::connect(&self.server).await?;
        codec::write_frame(&mut stream, frame).await?;
        let response = codec::read_message(&mut stream, self.chunk_size).await?;
        debug!(
            server = %self.server,
            command = response.command,
            channel = response.channel,
            "Response received"
        );
        Ok(response)
    }

    async fn expect_success(&self, frame: &[u8]) -> Result<Message, ClientError> {
        let response = self.request(frame).await?;
        match Command::try_from(response.command) {
            Ok(Command::NotifySuccess) => Ok(response),
            Ok(Command::NotifyFailure) => Err(ClientError::Refused(response.text())),
            _ => Err(ClientError::UnexpectedResponse(response.command)),
        }
    }
}
