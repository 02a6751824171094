//! Read-only access to the loaded page, as seen by the content script.
//!
//! Extraction strategies only ever talk to a [`PageDom`]. The browser-side
//! implementation wraps `document.querySelector`; [`PageSnapshot`] is a
//! serializable capture of the same elements, used when the page is scraped
//! ahead of time and in tests.

use crate::error::DomError;
use serde::{Deserialize, Serialize};

/// A single element lookup, resolved against the first matching element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// `meta[name=...]`, reads `content`
    MetaName(&'a str),
    /// `meta[property=...]`, reads `content`
    MetaProperty(&'a str),
    /// `meta[itemprop=...]`, reads `content`
    MetaItemProp(&'a str),
    /// `link[rel=...]`, reads `href`
    LinkRel(&'a str),
    /// `link[itemprop=...]`, reads `href`
    LinkItemProp(&'a str),
}

impl Lookup<'_> {
    /// Equivalent CSS selector, for logging
    pub fn selector(&self) -> String {
        match self {
            Lookup::MetaName(v) => format!("meta[name=\"{}\"]", v),
            Lookup::MetaProperty(v) => format!("meta[property=\"{}\"]", v),
            Lookup::MetaItemProp(v) => format!("meta[itemprop=\"{}\"]", v),
            Lookup::LinkRel(v) => format!("link[rel=\"{}\"]", v),
            Lookup::LinkItemProp(v) => format!("link[itemprop=\"{}\"]", v),
        }
    }
}

/// Page DOM query interface
///
/// `Ok(None)` means the element or attribute is absent, which is normal.
/// `Err` is reserved for unexpected failures (detached document, bad selector).
pub trait PageDom: Send + Sync {
    /// Current page location
    fn location(&self) -> Result<Option<String>, DomError>;

    /// Value of the first element matching `lookup`
    fn lookup(&self, lookup: Lookup<'_>) -> Result<Option<String>, DomError>;

    /// Attribute value of the first element matching a CSS selector
    fn element_attribute(&self, selector: &str, attribute: &str)
        -> Result<Option<String>, DomError>;

    /// First present value among `lookups`, in order
    fn first_of(&self, lookups: &[Lookup<'_>]) -> Result<Option<String>, DomError> {
        for lookup in lookups {
            if let Some(value) = self.lookup(*lookup)? {
                if !value.trim().is_empty() {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }
}

/// `<meta>` element as captured from the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemprop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// `<link>` element as captured from the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemprop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Attribute of an arbitrary element, addressed by CSS selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAttribute {
    pub selector: String,
    pub attribute: String,
    pub value: String,
}

/// Serializable capture of the page elements extraction reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub meta: Vec<MetaElement>,
    #[serde(default)]
    pub links: Vec<LinkElement>,
    #[serde(default)]
    pub elements: Vec<ElementAttribute>,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_meta_name(mut self, name: &str, content: &str) -> Self {
        self.meta.push(MetaElement {
            name: Some(name.to_string()),
            content: Some(content.to_string()),
            ..MetaElement::default()
        });
        self
    }

    pub fn with_meta_property(mut self, property: &str, content: &str) -> Self {
        self.meta.push(MetaElement {
            property: Some(property.to_string()),
            content: Some(content.to_string()),
            ..MetaElement::default()
        });
        self
    }

    pub fn with_meta_itemprop(mut self, itemprop: &str, content: &str) -> Self {
        self.meta.push(MetaElement {
            itemprop: Some(itemprop.to_string()),
            content: Some(content.to_string()),
            ..MetaElement::default()
        });
        self
    }

    pub fn with_link_rel(mut self, rel: &str, href: &str) -> Self {
        self.links.push(LinkElement {
            rel: Some(rel.to_string()),
            href: Some(href.to_string()),
            ..LinkElement::default()
        });
        self
    }

    pub fn with_link_itemprop(mut self, itemprop: &str, href: &str) -> Self {
        self.links.push(LinkElement {
            itemprop: Some(itemprop.to_string()),
            href: Some(href.to_string()),
            ..LinkElement::default()
        });
        self
    }

    pub fn with_attribute(mut self, selector: &str, attribute: &str, value: &str) -> Self {
        self.elements.push(ElementAttribute {
            selector: selector.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        });
        self
    }

    fn find_meta(&self, matches: impl Fn(&MetaElement) -> bool) -> Option<String> {
        self.meta.iter().find(|m| matches(m)).and_then(|m| m.content.clone())
    }

    fn find_link(&self, matches: impl Fn(&LinkElement) -> bool) -> Option<String> {
        self.links.iter().find(|l| matches(l)).and_then(|l| l.href.clone())
    }
}

/// `rel` is a space-separated token list in HTML
fn rel_contains(rel: &Option<String>, wanted: &str) -> bool {
    rel.as_deref()
        .map(|r| r.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case(wanted)))
        .unwrap_or(false)
}

impl PageDom for PageSnapshot {
    fn location(&self) -> Result<Option<String>, DomError> {
        Ok(self.url.clone())
    }

    fn lookup(&self, lookup: Lookup<'_>) -> Result<Option<String>, DomError> {
        let found = match lookup {
            Lookup::MetaName(name) => self.find_meta(|m| m.name.as_deref() == Some(name)),
            Lookup::MetaProperty(prop) => self.find_meta(|m| m.property.as_deref() == Some(prop)),
            Lookup::MetaItemProp(prop) => self.find_meta(|m| m.itemprop.as_deref() == Some(prop)),
            Lookup::LinkRel(rel) => self.find_link(|l| rel_contains(&l.rel, rel)),
            Lookup::LinkItemProp(prop) => self.find_link(|l| l.itemprop.as_deref() == Some(prop)),
        };
        Ok(found)
    }

    fn element_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, DomError> {
        if selector.trim().is_empty() {
            return Err(DomError::InvalidSelector(selector.to_string()));
        }
        Ok(self
            .elements
            .iter()
            .find(|e| e.selector == selector && e.attribute == attribute)
            .map(|e| e.value.clone()))
    }
}
