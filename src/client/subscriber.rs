use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::transport::codec;
use crate::transport::message::{self, Command, NO_CHANNEL};
use crate::utils::error::ClientError;

const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A file pushed by the relay to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: u8,
    pub filename: String,
    pub content: Bytes,
}

/// Callback endpoint of a subscriber.
pub struct SubscriberListener {
    listener: TcpListener,
    filename_width: usize,
    chunk_size: usize,
}

impl SubscriberListener {
    /// Bind the callback endpoint. Use port `0` to let the OS pick one.
    pub async fn bind(addr: impl ToSocketAddrs, filename_width: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            filename_width,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept the next delivery and acknowledge it with notify-success.
    pub async fn accept_delivery(&self) -> Result<Delivery, ClientError> {
        let (mut stream, delivery) = self.receive().await?;
        let ack = message::encode(Command::NotifySuccess, delivery.channel, b"ok");
        codec::write_frame(&mut stream, &ack).await?;
        Ok(delivery)
    }

    /// Accept the next delivery but answer notify-failure with `reason`.
    pub async fn refuse_delivery(&self, reason: &str) -> Result<Delivery, ClientError> {
        let (mut stream, delivery) = self.receive().await?;
        let nack = message::encode(Command::NotifyFailure, delivery.channel, reason.as_bytes());
        codec::write_frame(&mut stream, &nack).await?;
        Ok(delivery)
    }

    async fn receive(&self) -> Result<(TcpStream, Delivery), ClientError> {
        let (mut stream, peer) = self.listener.accept().await?;
        let incoming = codec::read_message(&mut stream, self.chunk_size).await?;

        if incoming.command != Command::Send.as_u8() {
            let nack = message::encode(Command::NotifyFailure, NO_CHANNEL, b"invalid command");
            codec::write_frame(&mut stream, &nack).await?;
            return Err(ClientError::UnexpectedResponse(incoming.command));
        }
        if incoming.body.len() < self.filename_width {
            return Err(ClientError::MalformedDelivery {
                len: incoming.body.len(),
                width: self.filename_width,
            });
        }

        let filename = message::parse_filename(&incoming.body[..self.filename_width]);
        let content = incoming.body.slice(self.filename_width..);
        debug!(%peer, channel = incoming.channel, %filename, bytes = content.len(), "Delivery received");

        Ok((
            stream,
            Delivery {
                channel: incoming.channel,
                filename,
                content,
            },
        ))
    }
}
