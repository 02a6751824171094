//! Core types shared by the background coordinator and the content script.
//!
//! This module defines the records exchanged with the native peer, the typed
//! messages sent to a tab's content script, and the metadata mapping that
//! flows back through both hops.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Browser-assigned tab identifier
pub type TabId = i64;

/// The tab considered "active" for one request
///
/// Resolved fresh for every request; never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabRef {
    /// Tab identifier used to address the content script
    pub id: TabId,
    /// Page URL as reported by the tab query (absent for privileged pages)
    pub url: Option<String>,
}

impl TabRef {
    pub fn new(id: TabId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: Some(url.into()),
        }
    }

    pub fn without_url(id: TabId) -> Self {
        Self { id, url: None }
    }
}

/// Closed set of metadata extraction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteCategory {
    /// YouTube watch pages
    Youtube,
    /// Vimeo video pages
    Vimeo,
    /// Any other page, read through Open Graph tags
    Generic,
}

impl SiteCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteCategory::Youtube => "youtube",
            SiteCategory::Vimeo => "vimeo",
            SiteCategory::Generic => "generic",
        }
    }

    /// Discriminator written under the `type` key of extracted metadata
    pub fn type_tag(&self) -> &'static str {
        match self {
            SiteCategory::Youtube => "yt",
            SiteCategory::Vimeo => "vimeo",
            SiteCategory::Generic => "og",
        }
    }

    pub fn all() -> &'static [SiteCategory] {
        &[SiteCategory::Youtube, SiteCategory::Vimeo, SiteCategory::Generic]
    }
}

impl fmt::Display for SiteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key holding the strategy discriminator inside [`Metadata`]
pub const TYPE_KEY: &str = "type";

/// Flat string-to-string metadata mapping
///
/// Serializes as a plain JSON object, e.g. `{"type":"yt","title":"..."}`.
/// An empty mapping (`{}`) is the fail-soft result of a broken extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Empty mapping, used when extraction fails outright
    pub fn empty() -> Self {
        Self::default()
    }

    /// Mapping carrying only the strategy discriminator
    pub fn typed(type_tag: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TYPE_KEY.to_string(), type_tag.to_string());
        Self(fields)
    }

    /// Insert a field; blank values are treated as absent and skipped
    pub fn insert(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.0.insert(key.to_string(), value.to_string());
        }
    }

    pub fn insert_opt(&mut self, key: &str, value: Option<String>) {
        if let Some(value) = value {
            self.insert(key, &value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.get(TYPE_KEY)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ---------------------------------------------------------------------------
// Background <-> content script
// ---------------------------------------------------------------------------

/// Action tag understood by the content script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentAction {
    /// Extract page metadata for a category
    #[serde(rename = "meta")]
    Meta,
    /// Report the page location only
    #[serde(rename = "getTabInfo")]
    TabInfo,
}

/// Typed message delivered to a tab's content script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub action: ContentAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SiteCategory>,
}

impl MetadataRequest {
    pub fn meta(category: SiteCategory) -> Self {
        Self {
            action: ContentAction::Meta,
            category: Some(category),
        }
    }

    pub fn tab_info() -> Self {
        Self {
            action: ContentAction::TabInfo,
            category: None,
        }
    }
}

/// Content script reply: a metadata mapping or an error indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentReply {
    Error { error: String },
    Metadata(Metadata),
}

// ---------------------------------------------------------------------------
// Background <-> native peer
// ---------------------------------------------------------------------------

/// Record tags defined by the native peer protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeerAction {
    /// Liveness record sent once after each successful connect
    Ping,
    /// Request metadata for the active tab
    GetTabMeta,
    /// Request the active tab URL only
    UrlInfo,
}

impl PeerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerAction::Ping => "ping",
            PeerAction::GetTabMeta => "getTabMeta",
            PeerAction::UrlInfo => "urlInfo",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ping" => Some(PeerAction::Ping),
            "getTabMeta" => Some(PeerAction::GetTabMeta),
            "urlInfo" => Some(PeerAction::UrlInfo),
            _ => None,
        }
    }

    /// Whether the peer may send this tag as a request expecting a response
    pub fn is_request(&self) -> bool {
        matches!(self, PeerAction::GetTabMeta | PeerAction::UrlInfo)
    }
}

impl fmt::Display for PeerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness record posted after each successful connect
pub fn ping_record() -> Value {
    serde_json::json!({ "action": PeerAction::Ping.as_str() })
}

/// An accepted inbound request from the native peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerRequest {
    pub action: PeerAction,
    /// Correlation id, echoed back verbatim when present
    pub id: Option<u64>,
}

#[derive(Deserialize)]
struct RawPeerRecord {
    action: String,
    #[serde(default)]
    id: Option<u64>,
}

impl PeerRequest {
    pub fn new(action: PeerAction) -> Self {
        Self { action, id: None }
    }

    /// Accept a raw peer record if it carries a recognized request tag
    pub fn parse(message: &Value) -> Option<Self> {
        let raw: RawPeerRecord = serde_json::from_value(message.clone()).ok()?;
        let action = PeerAction::from_tag(&raw.action)?;
        if !action.is_request() {
            return None;
        }
        Some(Self { action, id: raw.id })
    }
}

/// Result carried under `data` in a response record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Request could not be served at all
    Error { error: String },
    /// Extraction succeeded
    Metadata {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        meta: Metadata,
    },
    /// Tab found, but no metadata could be extracted
    UrlOnly { url: String },
}

impl ResponsePayload {
    pub fn error(message: impl Into<String>) -> Self {
        ResponsePayload::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResponsePayload::Error { .. })
    }
}

/// Response record sent to the native peer, keyed by the request's tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerResponse {
    pub action: PeerAction,
    pub data: ResponsePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// Lifecycle of the single native peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
