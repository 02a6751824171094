//! Background coordinator.
//!
//! Wires the connection manager, the site table and the request router
//! together, and drives the inbound record loop.

use crate::browser::{NativeTransport, TabMessenger, TabQuery};
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::router::{RequestRouter, RouteOutcome};
use crate::types::{PeerAction, PeerRequest};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Capacity of the inbound record channel
const INBOUND_CAPACITY: usize = 100;

/// Long-lived background context of the extension
pub struct BackgroundCoordinator {
    connection: ConnectionManager,
    router: Arc<RequestRouter>,
    /// Records received from the native peer
    inbound_rx: Option<mpsc::Receiver<Value>>,
    stop: watch::Sender<bool>,
}

impl BackgroundCoordinator {
    pub fn new(
        config: &Config,
        transport: Arc<dyn NativeTransport>,
        tabs: Arc<dyn TabQuery>,
        messenger: Arc<dyn TabMessenger>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let connection = ConnectionManager::new(config.connection.clone(), transport, tx);
        let sites = Arc::new(config.site_registry());
        let router = RequestRouter::new(
            config.router.clone(),
            connection.clone(),
            tabs,
            messenger,
            sites,
        );

        Self {
            connection,
            router: Arc::new(router),
            inbound_rx: Some(rx),
            stop: watch::channel(false).0,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn router(&self) -> Arc<RequestRouter> {
        Arc::clone(&self.router)
    }

    /// Take the inbound record receiver (can only be called once)
    pub fn take_inbound(&mut self) -> Option<mpsc::Receiver<Value>> {
        self.inbound_rx.take()
    }

    /// Install/startup hook; a failed connect is logged and retried in the background
    pub async fn on_install(&self) {
        info!("Extension installed, connecting to {}", self.connection.peer_name());
        match self.connection.ensure_connected().await {
            Ok(()) => info!("Native peer {} ready", self.connection.peer_name()),
            Err(e) => warn!("Initial connection failed: {}", e),
        }
    }

    /// Act on a locally triggered request (e.g. a UI action)
    pub async fn trigger(&self, action: PeerAction) -> RouteOutcome {
        if !action.is_request() {
            debug!("Ignoring local trigger for {}", action);
            return RouteOutcome::Ignored;
        }
        self.router.handle_request(PeerRequest::new(action)).await
    }

    /// Serve inbound records until shutdown or until the channel closes
    ///
    /// Each record is handled on its own task so a slow tab never blocks the
    /// next request. Returns after every spawned handler finished.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Value>) {
        let mut handlers = JoinSet::new();
        let mut stop = self.stop.subscribe();

        loop {
            let message = tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = stop.wait_for(|stopped| *stopped) => break,
            };

            let router = Arc::clone(&self.router);
            handlers.spawn(async move { router.handle_incoming_request(&message).await });

            // Reap finished handlers without waiting
            while let Some(done) = handlers.try_join_next() {
                log_handler_result(done);
            }
        }

        while let Some(done) = handlers.join_next().await {
            log_handler_result(done);
        }
        info!("Background loop stopped");
    }

    /// Stop the run loop and close the native port
    pub async fn shutdown(&self) {
        self.stop.send_replace(true);
        self.connection.shutdown().await;
    }
}

fn log_handler_result(result: Result<RouteOutcome, tokio::task::JoinError>) {
    match result {
        Ok(RouteOutcome::Undelivered { response, error }) => {
            warn!("Dropped {} response: {}", response.action, error);
        }
        Ok(_) => {}
        Err(e) => error!("Request handler panicked: {}", e),
    }
}
