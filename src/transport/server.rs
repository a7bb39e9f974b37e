//! TCP listener
//!
//! Accepts connections and hands each one to a freshly spawned task running
//! the [`Dispatcher`]. The accept loop never waits on client I/O. A failed
//! `accept` is treated as fatal and ends the loop with an error.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::broker::registry::SubscriptionRegistry;
use crate::config::{RelaySettings, Settings, ServerSettings};
use crate::transport::connection::Dispatcher;
use crate::utils::error::ServerError;

/// Bind the listener described by `settings`.
pub async fn bind(settings: &ServerSettings) -> Result<TcpListener, ServerError> {
    let addr = settings.address();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Run the accept loop on an already bound listener.
///
/// Only returns when `accept` fails.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<SubscriptionRegistry>,
    settings: RelaySettings,
) -> Result<(), ServerError> {
    let dispatcher = Dispatcher::new(registry, settings);

    loop {
        let (stream, peer) = listener.accept().await.map_err(ServerError::Accept)?;
        let dispatcher = dispatcher.clone();
        let span = info_span!("connection", id = %Uuid::new_v4(), %peer);

        tokio::spawn(
            async move {
                info!("Accepted connection");
                dispatcher.handle(stream).await;
            }
            .instrument(span),
        );
    }
}

/// Build the registry, bind the listener and serve until the listener fails.
pub async fn start_relay_server(settings: Settings) -> Result<(), ServerError> {
    let listener = bind(&settings.server).await?;
    let registry = Arc::new(SubscriptionRegistry::new(settings.relay.channels));

    info!(
        address = %settings.server.address(),
        channels = settings.relay.channels,
        concurrent = settings.relay.send_files_concurrently,
        "Relay server listening"
    );

    serve(listener, registry, settings.relay).await
}
