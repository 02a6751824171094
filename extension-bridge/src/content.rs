//! Content script side of the relay.
//!
//! Answers typed requests from the background coordinator using the page it
//! runs in. Every well-formed request gets a reply, even when extraction fails.

use crate::config::ContentConfig;
use crate::extractors::{MetadataExtractor, SiteRegistry};
use crate::page::PageDom;
use crate::types::{ContentAction, ContentReply, Metadata, MetadataRequest, SiteCategory};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const TAB_INFO_FAILED: &str = "Failed to get tab information";

/// Content script bound to one loaded page
pub struct ContentScript<D> {
    page: D,
    extractor: Arc<MetadataExtractor>,
    sites: Arc<SiteRegistry>,
    settle_delay: Duration,
}

impl<D: PageDom> ContentScript<D> {
    pub fn new(
        page: D,
        extractor: Arc<MetadataExtractor>,
        sites: Arc<SiteRegistry>,
        config: &ContentConfig,
    ) -> Self {
        Self {
            page,
            extractor,
            sites,
            settle_delay: config.settle_delay(),
        }
    }

    pub fn page(&self) -> &D {
        &self.page
    }

    /// Handle a raw runtime message; `None` for messages this script ignores
    pub async fn handle_message(&self, message: &Value) -> Option<ContentReply> {
        match serde_json::from_value::<MetadataRequest>(message.clone()) {
            Ok(request) => Some(self.handle_request(&request).await),
            Err(e) => {
                debug!("Ignoring message {}: {}", message, e);
                None
            }
        }
    }

    /// Answer a typed request
    pub async fn handle_request(&self, request: &MetadataRequest) -> ContentReply {
        match request.action {
            ContentAction::Meta => {
                let category = request.category.unwrap_or_else(|| self.page_category());
                ContentReply::Metadata(self.extract(category).await)
            }
            ContentAction::TabInfo => self.tab_info(),
        }
    }

    /// Extract metadata for `category` after the settle delay; `{}` on failure
    pub async fn extract(&self, category: SiteCategory) -> Metadata {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        self.extractor.extract(category, &self.page)
    }

    /// Category of the page this script runs in
    fn page_category(&self) -> SiteCategory {
        match self.page.location() {
            Ok(Some(url)) => self.sites.derive_category(&url),
            Ok(None) => SiteCategory::Generic,
            Err(e) => {
                warn!("Cannot read page location: {}", e);
                SiteCategory::Generic
            }
        }
    }

    fn tab_info(&self) -> ContentReply {
        match self.page.location() {
            Ok(Some(url)) => {
                let mut info = Metadata::empty();
                info.insert("url", &url);
                ContentReply::Metadata(info)
            }
            Ok(None) => ContentReply::Error {
                error: TAB_INFO_FAILED.to_string(),
            },
            Err(e) => {
                error!("Error processing getTabInfo request: {}", e);
                ContentReply::Error {
                    error: TAB_INFO_FAILED.to_string(),
                }
            }
        }
    }
}
