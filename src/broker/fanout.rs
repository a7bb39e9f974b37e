//! Fan-out broadcaster
//!
//! Turns one received file into one outbound delivery per subscriber of the
//! target channel. Each delivery opens its own TCP connection to the
//! subscriber's callback address, writes the framed file and waits for the
//! subscriber's notification.
//!
//! Deliveries are independent: a failure is logged and affects only that
//! attempt. Nothing is retried and the registry is never changed because of a
//! delivery outcome, so an unreachable subscriber stays subscribed until it
//! unsubscribes.
//!
//! In concurrent mode every delivery is spawned as a detached task and
//! `broadcast` returns without waiting for any of them.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::broker::registry::{Channel, SubscriptionRegistry};
use crate::config::RelaySettings;
use crate::transport::codec;
use crate::transport::message::{self, Command};
use crate::utils::error::DeliveryError;

/// How a subscriber answered a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Subscriber answered notify-success.
    Delivered,
    /// Subscriber answered notify-failure with this reason.
    Refused(String),
    /// Subscriber answered with a command that is not a notification.
    Unexpected(u8),
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
    concurrent: bool,
    chunk_size: usize,
    delivery_timeout: Option<Duration>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriptionRegistry>, settings: &RelaySettings) -> Self {
        Self {
            registry,
            concurrent: settings.send_files_concurrently,
            chunk_size: settings.buffer_size,
            delivery_timeout: settings.delivery_timeout(),
        }
    }

    /// Deliver a file to every current subscriber of `channel`.
    ///
    /// Returns the number of deliveries started, i.e. the snapshot size.
    pub async fn broadcast(&self, channel: Channel, filename_field: &[u8], content: &[u8]) -> usize {
        let frame = message::encode_file(channel.get(), filename_field, content);
        let subscribers = self.registry.snapshot(channel);
        let total = subscribers.len();

        info!(
            %channel,
            subscribers = total,
            bytes = content.len(),
            concurrent = self.concurrent,
            "Broadcasting file"
        );

        for (position, address) in subscribers.into_iter().enumerate() {
            debug!(%channel, "({}/{}) Sending file to {}", position + 1, total, address);
            let span = info_span!("delivery", %channel, subscriber = %address);

            if self.concurrent {
                let frame = frame.clone();
                let chunk_size = self.chunk_size;
                let timeout = self.delivery_timeout;
                tokio::spawn(
                    async move { deliver_and_log(&address, frame, chunk_size, timeout).await }
                        .instrument(span),
                );
            } else {
                deliver_and_log(&address, frame.clone(), self.chunk_size, self.delivery_timeout)
                    .instrument(span)
                    .await;
            }
        }

        total
    }
}

async fn deliver_and_log(
    address: &str,
    frame: Bytes,
    chunk_size: usize,
    timeout: Option<Duration>,
) {
    match deliver(address, &frame, chunk_size, timeout).await {
        Ok(DeliveryOutcome::Delivered) => {
            info!(subscriber = %address, "Delivered file");
        }
        Ok(DeliveryOutcome::Refused(reason)) => {
            warn!(subscriber = %address, %reason, "Subscriber reported an error");
        }
        Ok(DeliveryOutcome::Unexpected(command)) => {
            warn!(subscriber = %address, command, "Invalid command in subscriber response");
        }
        Err(e) => {
            warn!(subscriber = %address, error = %e, "Delivery failed");
        }
    }
}

/// Perform one delivery attempt of an already framed `Send` message.
///
/// The outbound connection is dropped when the attempt concludes, whatever
/// the outcome.
pub async fn deliver(
    address: &str,
    frame: &[u8],
    chunk_size: usize,
    timeout: Option<Duration>,
) -> Result<DeliveryOutcome, DeliveryError> {
    let attempt = attempt_delivery(address, frame, chunk_size);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| DeliveryError::TimedOut(limit))?,
        None => attempt.await,
    }
}

async fn attempt_delivery(
    address: &str,
    frame: &[u8],
    chunk_size: usize,
) -> Result<DeliveryOutcome, DeliveryError> {
    let mut stream =
        TcpStream::connect(address)
            .await
            .map_err(|source| DeliveryError::Connect {
                address: address.to_string(),
                source,
            })?;

    codec::write_frame(&mut stream, frame)
        .await
        .map_err(DeliveryError::Write)?;

    let response = codec::read_message(&mut stream, chunk_size)
        .await
        .map_err(DeliveryError::Response)?;

    Ok(match Command::try_from(response.command) {
        Ok(Command::NotifySuccess) => DeliveryOutcome::Delivered,
        Ok(Command::NotifyFailure) => DeliveryOutcome::Refused(response.text()),
        _ => DeliveryOutcome::Unexpected(response.command),
    })
}
