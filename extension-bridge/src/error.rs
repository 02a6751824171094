//! Error types for each hop of the relay.

use crate::types::{SiteCategory, TabId};

/// Failure reported by the native-messaging transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Native host not found: {0}")]
    HostNotFound(String),

    #[error("Port closed")]
    PortClosed,

    #[error("Transport error: {0}")]
    Other(String),
}

/// The native peer could not be reached or did not complete the handshake
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Native peer {peer} unreachable: {source}")]
    Unreachable {
        peer: String,
        #[source]
        source: TransportError,
    },

    #[error("Handshake with {peer} failed: {source}")]
    Handshake {
        peer: String,
        #[source]
        source: TransportError,
    },

    #[error("Connection manager is shut down")]
    Shutdown,
}

/// A specific message could not be handed to the transport
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Not connected to native peer")]
    NotConnected,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport rejected message: {source}")]
    Transport {
        /// Generation of the port that rejected the post
        generation: u64,
        #[source]
        source: TransportError,
    },
}

/// A response could not be delivered to the native peer
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Send(#[from] SendError),
}

/// Failure from the tab query or cross-context messaging collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrowserError {
    #[error("no active tab")]
    NoActiveTab,

    #[error("Tab query failed: {0}")]
    TabQuery(String),

    #[error("No receiving end in tab {0}")]
    NoReceiver(TabId),

    #[error("Messaging error: {0}")]
    Messaging(String),
}

/// Unexpected failure while reading the page
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Document unavailable")]
    Detached,

    #[error("DOM query failed: {0}")]
    Query(String),
}

/// Extraction fault; always absorbed into an empty mapping by the dispatcher
#[derive(Debug, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("No extractor registered for {0}")]
    Unsupported(SiteCategory),

    #[error("{category} extraction failed: {source}")]
    Dom {
        category: SiteCategory,
        #[source]
        source: DomError,
    },
}
