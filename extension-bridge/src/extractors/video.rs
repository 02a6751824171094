//! Video site strategies.
//!
//! Video pages embed schema.org `VideoObject` microdata as `itemprop`
//! meta/link elements. The player's progress bar exposes playback position
//! through an ARIA attribute.

use super::Extractor;
use crate::error::{DomError, ExtractionFailure};
use crate::page::{Lookup, PageDom};
use crate::types::{Metadata, SiteCategory};

/// Site-specific knobs for a video strategy
#[derive(Debug, Clone)]
pub struct VideoProfile {
    pub category: SiteCategory,
    /// CSS selector of the player's progress indicator
    pub progress_selector: &'static str,
    /// Attribute on the progress indicator holding the position
    pub progress_attribute: &'static str,
}

/// Strategy for pages of a known video site
pub struct VideoSiteExtractor {
    profile: VideoProfile,
}

impl VideoSiteExtractor {
    pub fn new(profile: VideoProfile) -> Self {
        Self { profile }
    }

    pub fn youtube() -> Self {
        Self::new(VideoProfile {
            category: SiteCategory::Youtube,
            progress_selector: ".ytp-progress-bar",
            progress_attribute: "aria-valuenow",
        })
    }

    pub fn vimeo() -> Self {
        Self::new(VideoProfile {
            category: SiteCategory::Vimeo,
            progress_selector: ".vp-progress",
            progress_attribute: "aria-valuenow",
        })
    }

    pub fn profile(&self) -> &VideoProfile {
        &self.profile
    }

    fn read(&self, page: &dyn PageDom) -> Result<Metadata, DomError> {
        let mut meta = Metadata::typed(self.profile.category.type_tag());

        meta.insert_opt(
            "title",
            page.first_of(&[Lookup::MetaItemProp("name"), Lookup::MetaName("title")])?,
        );
        meta.insert_opt(
            "description",
            page.first_of(&[
                Lookup::MetaItemProp("description"),
                Lookup::MetaName("description"),
            ])?,
        );
        meta.insert_opt("upload_date", page.lookup(Lookup::MetaItemProp("uploadDate"))?);
        meta.insert_opt("genre", page.lookup(Lookup::MetaItemProp("genre"))?);
        meta.insert_opt(
            "thumbnail",
            page.first_of(&[
                Lookup::LinkItemProp("thumbnailUrl"),
                Lookup::MetaItemProp("thumbnailUrl"),
            ])?,
        );
        meta.insert_opt(
            "progress",
            page.element_attribute(self.profile.progress_selector, self.profile.progress_attribute)?,
        );

        Ok(meta)
    }
}

impl Extractor for VideoSiteExtractor {
    fn extract(&self, page: &dyn PageDom) -> Result<Metadata, ExtractionFailure> {
        self.read(page).map_err(|source| ExtractionFailure::Dom {
            category: self.profile.category,
            source,
        })
    }

    fn category(&self) -> SiteCategory {
        self.profile.category
    }
}
