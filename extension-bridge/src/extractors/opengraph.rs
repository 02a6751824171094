//! Generic strategy reading Open Graph tags.

use super::Extractor;
use crate::error::{DomError, ExtractionFailure};
use crate::page::{Lookup, PageDom};
use crate::types::{Metadata, SiteCategory};

/// Strategy for any page not covered by a site-specific one
#[derive(Debug, Default)]
pub struct OpenGraphExtractor;

impl OpenGraphExtractor {
    pub fn new() -> Self {
        Self
    }

    fn read(&self, page: &dyn PageDom) -> Result<Metadata, DomError> {
        let mut meta = Metadata::typed(SiteCategory::Generic.type_tag());

        meta.insert_opt("title", page.lookup(Lookup::MetaProperty("og:title"))?);
        meta.insert_opt("description", page.lookup(Lookup::MetaProperty("og:description"))?);
        meta.insert_opt("image", page.lookup(Lookup::MetaProperty("og:image"))?);
        // `type` is taken by the discriminator
        meta.insert_opt("og_type", page.lookup(Lookup::MetaProperty("og:type"))?);
        meta.insert_opt(
            "author",
            page.first_of(&[
                Lookup::MetaName("author"),
                Lookup::MetaProperty("article:author"),
            ])?,
        );
        meta.insert_opt(
            "url",
            page.first_of(&[Lookup::MetaProperty("og:url"), Lookup::LinkRel("canonical")])?,
        );

        Ok(meta)
    }
}

impl Extractor for OpenGraphExtractor {
    fn extract(&self, page: &dyn PageDom) -> Result<Metadata, ExtractionFailure> {
        self.read(page).map_err(|source| ExtractionFailure::Dom {
            category: SiteCategory::Generic,
            source,
        })
    }

    fn category(&self) -> SiteCategory {
        SiteCategory::Generic
    }
}
