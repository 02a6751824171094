//! Extension Bridge - Browser side of the page-metadata relay
//!
//! This crate links a native messaging peer with the page loaded in the
//! user's active browser tab:
//!
//! - **Connection**: Keeps a single native port alive and reconnects on loss
//! - **Router**: Turns peer requests into one response each, never more
//! - **Content**: Extracts metadata from the page using a per-site strategy
//!
//! # Architecture
//!
//! The background coordinator owns the connection and routes every inbound
//! record to the active tab's content script. Browser APIs are injected as
//! async traits so the whole flow runs without a browser.

pub mod background;
pub mod browser;
pub mod config;
pub mod connection;
pub mod content;
pub mod error;
pub mod extractors;
pub mod page;
pub mod router;
pub mod types;

// Re-export commonly used types
pub use background::BackgroundCoordinator;
pub use browser::{NativePort, NativeTransport, PortEvent, PortHandle, TabMessenger, TabQuery};
pub use config::Config;
pub use connection::ConnectionManager;
pub use content::ContentScript;
pub use error::{
    BrowserError, ConnectionError, DeliveryError, DomError, ExtractionFailure, SendError,
    TransportError,
};
pub use extractors::{Extractor, MetadataExtractor, SiteRegistry};
pub use page::{Lookup, PageDom, PageSnapshot};
pub use router::{RequestRouter, RouteOutcome};
pub use types::{
    ConnectionState, ContentAction, ContentReply, Metadata, MetadataRequest, PeerAction,
    PeerRequest, PeerResponse, ResponsePayload, SiteCategory, TabId, TabRef,
};
