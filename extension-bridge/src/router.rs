//! Request routing between the native peer and the active tab.
//!
//! Every accepted request produces exactly one response record. Tab-query and
//! messaging failures become payloads here; they never escape to the caller.

use crate::browser::{TabMessenger, TabQuery};
use crate::config::RouterConfig;
use crate::connection::ConnectionManager;
use crate::error::{BrowserError, DeliveryError, SendError};
use crate::extractors::SiteRegistry;
use crate::types::{
    ContentReply, MetadataRequest, PeerAction, PeerRequest, PeerResponse,
    ResponsePayload, SiteCategory, TabRef,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reported when neither metadata nor a URL could be obtained
const NO_METADATA: &str = "no metadata available";

/// What happened to one inbound record
#[derive(Debug)]
pub enum RouteOutcome {
    /// Not a recognized request; nothing was sent
    Ignored,
    /// Response handed to the transport
    Delivered(PeerResponse),
    /// Response built but every delivery attempt failed
    Undelivered {
        response: PeerResponse,
        error: DeliveryError,
    },
}

impl RouteOutcome {
    /// The response produced for this record, delivered or not
    pub fn response(&self) -> Option<&PeerResponse> {
        match self {
            RouteOutcome::Ignored => None,
            RouteOutcome::Delivered(response) => Some(response),
            RouteOutcome::Undelivered { response, .. } => Some(response),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, RouteOutcome::Delivered(_))
    }
}

/// Bridges one peer request to the active tab's content script and back
pub struct RequestRouter {
    config: RouterConfig,
    connection: ConnectionManager,
    tabs: Arc<dyn TabQuery>,
    messenger: Arc<dyn TabMessenger>,
    sites: Arc<SiteRegistry>,
}

impl RequestRouter {
    pub fn new(
        config: RouterConfig,
        connection: ConnectionManager,
        tabs: Arc<dyn TabQuery>,
        messenger: Arc<dyn TabMessenger>,
        sites: Arc<SiteRegistry>,
    ) -> Self {
        Self {
            config,
            connection,
            tabs,
            messenger,
            sites,
        }
    }

    /// Handle one raw record received from the native peer
    pub async fn handle_incoming_request(&self, message: &Value) -> RouteOutcome {
        match PeerRequest::parse(message) {
            Some(request) => self.handle_request(request).await,
            None => {
                debug!("Ignoring unrecognized peer record: {}", message);
                RouteOutcome::Ignored
            }
        }
    }

    /// Serve an accepted request and deliver its response
    pub async fn handle_request(&self, request: PeerRequest) -> RouteOutcome {
        let response = self.resolve(request).await;
        self.deliver(response).await
    }

    /// Build the response for a request without sending it
    pub async fn resolve(&self, request: PeerRequest) -> PeerResponse {
        let data = match self.active_tab().await {
            Ok(tab) => match request.action {
                PeerAction::UrlInfo => url_or_error(&tab),
                _ => self.collect_metadata(&tab).await,
            },
            Err(e) => {
                warn!("Cannot serve {}: {}", request.action, e);
                ResponsePayload::error(e.to_string())
            }
        };

        PeerResponse {
            action: request.action,
            data,
            id: request.id,
        }
    }

    /// Re-resolved on every request; the active tab changes between requests
    async fn active_tab(&self) -> Result<TabRef, BrowserError> {
        self.tabs
            .active_tab(self.config.focused_window_only)
            .await?
            .ok_or(BrowserError::NoActiveTab)
    }

    async fn collect_metadata(&self, tab: &TabRef) -> ResponsePayload {
        let category = tab
            .url
            .as_deref()
            .map(|url| self.sites.derive_category(url))
            .unwrap_or(SiteCategory::Generic);

        debug!("Requesting {} metadata from tab {}", category, tab.id);
        let request = MetadataRequest::meta(category);

        match self.messenger.send_to_tab(tab.id, &request).await {
            Ok(ContentReply::Metadata(meta)) if !meta.is_empty() => ResponsePayload::Metadata {
                url: tab.url.clone(),
                meta,
            },
            Ok(ContentReply::Metadata(_)) => {
                debug!("Tab {} returned no metadata", tab.id);
                url_or_error(tab)
            }
            Ok(ContentReply::Error { error }) => {
                warn!("Content script in tab {} reported: {}", tab.id, error);
                url_or_error(tab)
            }
            Err(e) => {
                warn!("No metadata from tab {}: {}", tab.id, e);
                url_or_error(tab)
            }
        }
    }

    /// Send with request-level retry; the connection manager never retries
    ///
    /// A port that rejected a post is discarded before the next attempt, so
    /// the retry goes out on a fresh connection even when the browser has
    /// not reported the disconnect yet.
    async fn deliver(&self, response: PeerResponse) -> RouteOutcome {
        let attempts = self.config.send_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            match self.try_deliver(&response).await {
                Ok(()) => {
                    info!("Sent {} response to native peer", response.action);
                    return RouteOutcome::Delivered(response);
                }
                Err(error) if attempt >= attempts => {
                    warn!(
                        "Giving up on {} response after {} attempt(s): {}",
                        response.action, attempt, error
                    );
                    return RouteOutcome::Undelivered { response, error };
                }
                Err(e) => {
                    warn!("Delivering {} response failed, retrying: {}", response.action, e);
                    if let DeliveryError::Send(SendError::Transport { generation, .. }) = e {
                        self.connection.discard_port(generation).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn try_deliver(&self, response: &PeerResponse) -> Result<(), DeliveryError> {
        self.connection.ensure_connected().await?;
        self.connection.send(response).await?;
        Ok(())
    }
}

/// Fallback payload: the tab URL alone, or an error when there is none
fn url_or_error(tab: &TabRef) -> ResponsePayload {
    match &tab.url {
        Some(url) => ResponsePayload::UrlOnly { url: url.clone() },
        None => ResponsePayload::error(NO_METADATA),
    }
}
