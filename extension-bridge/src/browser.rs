//! Browser runtime collaborators.
//!
//! The extension runtime's callback APIs are expressed as async traits:
//! failures surface as `Err` instead of an out-of-band `lastError` flag.

use crate::error::{BrowserError, TransportError};
use crate::types::{ContentReply, MetadataRequest, TabId, TabRef};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Event delivered by an open native port
#[derive(Debug, Clone, PartialEq)]
pub enum PortEvent {
    /// Structured record received from the native peer
    Message(Value),
    /// The port closed; no further events follow
    Disconnected { reason: Option<String> },
}

/// An open native port plus its event stream
pub struct PortHandle {
    pub port: Box<dyn NativePort>,
    pub events: mpsc::Receiver<PortEvent>,
}

/// Native-messaging transport (`runtime.connectNative`)
#[async_trait]
pub trait NativeTransport: Send + Sync {
    /// Open a port to the named native host
    async fn connect(&self, peer_name: &str) -> Result<PortHandle, TransportError>;
}

/// Outbound half of an open native port
#[async_trait]
pub trait NativePort: Send + Sync {
    /// Post one record; resolves once the transport accepted it
    async fn post(&self, message: &Value) -> Result<(), TransportError>;

    /// Close the port from this side
    fn disconnect(&self);
}

/// Tab query interface (`tabs.query`)
#[async_trait]
pub trait TabQuery: Send + Sync {
    /// The single active tab, of the focused window when `focused_window_only`
    async fn active_tab(&self, focused_window_only: bool) -> Result<Option<TabRef>, BrowserError>;
}

/// Cross-context messaging interface (`tabs.sendMessage`)
#[async_trait]
pub trait TabMessenger: Send + Sync {
    /// Deliver `request` to the tab's content script and await its reply
    async fn send_to_tab(
        &self,
        tab: TabId,
        request: &MetadataRequest,
    ) -> Result<ContentReply, BrowserError>;
}
