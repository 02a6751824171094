//! Metadata extraction strategies, keyed by site category.
//!
//! This module provides:
//! - `SiteRegistry`: exact-match hostname table deciding the category of a URL
//! - `Extractor`: one strategy per category
//! - `MetadataExtractor`: fail-soft dispatch from a category to its strategy

pub mod opengraph;
pub mod video;

use crate::error::ExtractionFailure;
use crate::page::PageDom;
use crate::types::{Metadata, SiteCategory};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

pub use opengraph::OpenGraphExtractor;
pub use video::VideoSiteExtractor;

/// Registry of known hostnames and the strategy each one uses
pub struct SiteRegistry {
    hosts: HashMap<String, SiteCategory>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        let mut hosts = HashMap::new();

        // YouTube
        hosts.insert("youtube.com".to_string(), SiteCategory::Youtube);
        hosts.insert("www.youtube.com".to_string(), SiteCategory::Youtube);
        hosts.insert("m.youtube.com".to_string(), SiteCategory::Youtube);
        hosts.insert("music.youtube.com".to_string(), SiteCategory::Youtube);

        // Vimeo
        hosts.insert("vimeo.com".to_string(), SiteCategory::Vimeo);
        hosts.insert("www.vimeo.com".to_string(), SiteCategory::Vimeo);
        hosts.insert("player.vimeo.com".to_string(), SiteCategory::Vimeo);

        Self { hosts }
    }

    /// Category for an exact hostname; unknown hosts are generic
    pub fn category_for_host(&self, host: &str) -> SiteCategory {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .copied()
            .unwrap_or(SiteCategory::Generic)
    }

    /// Derive the category of a page from its URL
    ///
    /// Unparseable URLs and URLs without a host fall back to generic.
    pub fn derive_category(&self, url: &str) -> SiteCategory {
        match url::Url::parse(url) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) => self.category_for_host(host),
                None => SiteCategory::Generic,
            },
            Err(e) => {
                trace!("Unparseable tab URL {:?}: {}", url, e);
                SiteCategory::Generic
            }
        }
    }

    /// Add or override a hostname entry
    pub fn add_site(&mut self, host: &str, category: SiteCategory) {
        self.hosts.insert(host.to_ascii_lowercase(), category);
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for metadata extraction strategies
pub trait Extractor: Send + Sync {
    /// Read whatever metadata is present; absent elements are omitted
    fn extract(&self, page: &dyn PageDom) -> Result<Metadata, ExtractionFailure>;

    /// Category this strategy serves
    fn category(&self) -> SiteCategory;
}

/// Dispatches a category to its strategy, absorbing every failure
pub struct MetadataExtractor {
    strategies: HashMap<SiteCategory, Box<dyn Extractor>>,
}

impl MetadataExtractor {
    /// Dispatcher with the built-in strategy for every category
    pub fn new() -> Self {
        let mut extractor = Self::empty();
        extractor.register(Box::new(VideoSiteExtractor::youtube()));
        extractor.register(Box::new(VideoSiteExtractor::vimeo()));
        extractor.register(Box::new(OpenGraphExtractor::new()));
        extractor
    }

    /// Dispatcher with no strategies registered
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Register a strategy, replacing any existing one for its category
    pub fn register(&mut self, strategy: Box<dyn Extractor>) {
        self.strategies.insert(strategy.category(), strategy);
    }

    /// Run the strategy for `category`, propagating failures
    pub fn try_extract(
        &self,
        category: SiteCategory,
        page: &dyn PageDom,
    ) -> Result<Metadata, ExtractionFailure> {
        let strategy = self
            .strategies
            .get(&category)
            .ok_or(ExtractionFailure::Unsupported(category))?;
        strategy.extract(page)
    }

    /// Run the strategy for `category`; any failure yields `{}`
    pub fn extract(&self, category: SiteCategory, page: &dyn PageDom) -> Metadata {
        match self.try_extract(category, page) {
            Ok(meta) => {
                debug!("Extracted {} fields for {}", meta.len(), category);
                meta
            }
            Err(e) => {
                warn!("Extraction failed, returning empty metadata: {}", e);
                Metadata::empty()
            }
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}
