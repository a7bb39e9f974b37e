//! Connection dispatcher
//!
//! Each accepted connection carries exactly one request. The dispatcher reads
//! the command byte, decodes the rest of the request into a [`Request`],
//! validates it and executes it against the registry or the broadcaster.
//! Every path answers the peer with one notification (best effort) and then
//! drops the connection.
//!
//! File transfers are fully buffered before anything is fanned out. The
//! publisher gets its `"received"` notification and its connection is closed
//! before the first delivery starts.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::broker::fanout::Broadcaster;
use crate::broker::registry::{Channel, SubscriptionRegistry};
use crate::config::RelaySettings;
use crate::transport::codec;
use crate::transport::message::{self, Command, NO_CHANNEL};
use crate::utils::error::RequestError;

/// Result of handling one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Success,
    /// The command byte could not be read.
    ConnectionError,
    /// The command byte is not a request this server accepts.
    Rejected,
    /// A field or body could not be read completely.
    IoError,
    /// The request was read but its values are out of range.
    ValidationError,
}

/// A file pushed by a publisher, fully read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    pub channel: Channel,
    /// The raw fixed-width filename field, forwarded to subscribers untouched.
    pub filename_field: Bytes,
    pub filename: String,
    pub content: Bytes,
}

/// A decoded and validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Subscribe { channel: Channel, address: String },
    Unsubscribe { channel: Channel, address: String },
    Send(FileTransfer),
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    broadcaster: Broadcaster,
    settings: Arc<RelaySettings>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, settings: RelaySettings) -> Self {
        let broadcaster = Broadcaster::new(registry.clone(), &settings);
        Self {
            registry,
            broadcaster,
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Handle one connection from its first byte until it is closed.
    ///
    /// Takes ownership of the stream; it is dropped exactly once on every path.
    pub async fn handle<S>(&self, mut stream: S) -> HandleStatus
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = self.read_request(&mut stream).await;
        let status = match request {
            Ok(request) => self.execute(request, stream).await,
            Err(e) => {
                warn!(error = %e, "Rejecting request");
                notify(&mut stream, Command::NotifyFailure, NO_CHANNEL, e.notice()).await;
                e.status()
            }
        };

        info!(?status, "Handled connection");
        status
    }

    /// Read and validate a complete request from the stream.
    pub async fn read_request<S>(&self, stream: &mut S) -> Result<Request, RequestError>
    where
        S: AsyncRead + Unpin,
    {
        let command = codec::read_u8(stream)
            .await
            .map_err(RequestError::CommandRead)?;

        match Command::try_from(command) {
            Ok(Command::Subscribe) => {
                debug!("Command received: subscribe");
                let (channel, address) = self.read_subscription(stream).await?;
                Ok(Request::Subscribe { channel, address })
            }
            Ok(Command::Unsubscribe) if self.settings.unsubscribe_enabled => {
                debug!("Command received: unsubscribe");
                let (channel, address) = self.read_subscription(stream).await?;
                Ok(Request::Unsubscribe { channel, address })
            }
            Ok(Command::Send) => {
                debug!("Command received: send");
                self.read_file(stream).await.map(Request::Send)
            }
            _ => Err(RequestError::InvalidCommand(command)),
        }
    }

    async fn read_subscription<S>(&self, stream: &mut S) -> Result<(Channel, String), RequestError>
    where
        S: AsyncRead + Unpin,
    {
        let raw_channel = codec::read_u8(stream)
            .await
            .map_err(RequestError::ChannelRead)?;
        let length = codec::read_length(stream)
            .await
            .map_err(RequestError::LengthRead)?;

        let channel = self
            .registry
            .channel(raw_channel)
            .ok_or(RequestError::InvalidChannel(raw_channel))?;
        if length == 0 {
            return Err(RequestError::InvalidContentLength(length));
        }

        let body = codec::read_body(stream, length, self.settings.buffer_size)
            .await
            .map_err(RequestError::ContentIncompleteRead)?;
        let address = String::from_utf8(body.to_vec()).map_err(|_| RequestError::InvalidAddress)?;

        Ok((channel, address))
    }

    async fn read_file<S>(&self, stream: &mut S) -> Result<FileTransfer, RequestError>
    where
        S: AsyncRead + Unpin,
    {
        let field_width = self.settings.filename_max_length;

        let raw_channel = codec::read_u8(stream)
            .await
            .map_err(RequestError::ChannelRead)?;
        let length = codec::read_length(stream)
            .await
            .map_err(RequestError::LengthRead)?;
        let filename_field = codec::read_field(stream, field_width)
            .await
            .map_err(RequestError::FilenameRead)?;

        let channel = self
            .registry
            .channel(raw_channel)
            .ok_or(RequestError::InvalidChannel(raw_channel))?;
        if length <= field_width as u64 {
            return Err(RequestError::InvalidContentLength(length));
        }
        let filename = message::parse_filename(&filename_field);
        if filename.is_empty() {
            return Err(RequestError::EmptyFilename);
        }

        let content_length = length - field_width as u64;
        debug!(%channel, %filename, bytes = content_length, "Receiving file");
        let content = codec::read_body(stream, content_length, self.settings.buffer_size)
            .await
            .map_err(RequestError::FileIncompleteRead)?;

        Ok(FileTransfer {
            channel,
            filename_field,
            filename,
            content,
        })
    }

    async fn execute<S>(&self, request: Request, mut stream: S) -> HandleStatus
    where
        S: AsyncWrite + Unpin,
    {
        match request {
            Request::Subscribe { channel, address } => {
                self.registry.register(address.clone(), channel);
                info!(%channel, %address, "New client subscribed");
                notify(&mut stream, Command::NotifySuccess, channel.get(), "subscribed").await;
            }
            Request::Unsubscribe { channel, address } => {
                self.registry.unregister(&address, channel);
                info!(%channel, %address, "Client unsubscribed");
                notify(&mut stream, Command::NotifySuccess, channel.get(), "unsubscribed").await;
            }
            Request::Send(transfer) => {
                info!(
                    channel = %transfer.channel,
                    filename = %transfer.filename,
                    bytes = transfer.content.len(),
                    "File received from client"
                );
                notify(
                    &mut stream,
                    Command::NotifySuccess,
                    transfer.channel.get(),
                    "received",
                )
                .await;
                drop(stream);

                self.broadcaster
                    .broadcast(transfer.channel, &transfer.filename_field, &transfer.content)
                    .await;
            }
        }

        HandleStatus::Success
    }
}

/// Send a notification to the peer. Failures are logged and otherwise ignored.
async fn notify<W>(stream: &mut W, command: Command, channel: u8, text: &str)
where
    W: AsyncWrite + Unpin,
{
    let frame = message::encode(command, channel, text.as_bytes());
    if let Err(e) = codec::write_frame(stream, &frame).await {
        warn!(error = %e, notice = text, "Error while sending response to client");
    }
}
