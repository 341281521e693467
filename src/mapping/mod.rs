//! Default mapping providers and the classic page mapping provider that
//! composes them.
//!
//! The table-driven providers here (taxonomy, metadata, URL, user, page
//! layout) are built from [`PageTransformationOptions`]. Anything not listed
//! in a table passes through unchanged; mapping to an empty target drops the
//! value.

mod classic;
mod web_part;

pub use classic::ClassicPageMappingProvider;
pub use web_part::{DefaultWebPartMappingProvider, UNMAPPED_WEB_PART_TEMPLATE};

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::contract::{
    MetadataMappingProvider, PageLayoutMappingProvider, TaxonomyMappingProvider,
    UrlMappingProvider, UserMappingProvider,
};
use crate::error::Result;
use crate::layout::{PageLayoutDescriptor, PageLayoutKind};
use crate::model::{FieldValue, PageTransformationContext, SourcePageKind, TaxonomyTerm};
use crate::options::{PageTransformationOptions, UrlMapping};

/// Wiki layouts whose right-most column is a sidebar.
const SIDEBAR_LAYOUTS: &[&str] = &["OneColumnSideBar", "OneColumnSidebar"];

#[derive(Debug, Clone, Default)]
pub struct DefaultPageLayoutMappingProvider;

#[async_trait]
impl PageLayoutMappingProvider for DefaultPageLayoutMappingProvider {
    async fn map_page_layout(
        &self,
        context: &PageTransformationContext,
        _token: &CancellationToken,
    ) -> Result<PageLayoutDescriptor> {
        let item = &context.source_item;
        let kind = match item.kind {
            SourcePageKind::WikiPage => PageLayoutKind::Wiki,
            SourcePageKind::WebPartPage => PageLayoutKind::WebPart,
            SourcePageKind::PublishingPage => PageLayoutKind::Publishing,
        };
        let name = item.page_layout.clone().unwrap_or_else(|| "OneColumn".to_string());
        let mut descriptor = PageLayoutDescriptor::new(name, kind);
        if SIDEBAR_LAYOUTS
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&descriptor.name))
        {
            descriptor = descriptor.with_vertical_column(None);
        }
        debug!(layout = %descriptor.name, ?kind, "[MAPPING] Page layout mapped");
        Ok(descriptor)
    }
}

/// Replaces term ids found in the table; other terms pass through.
#[derive(Debug, Clone, Default)]
pub struct DefaultTaxonomyMappingProvider {
    term_mappings: BTreeMap<String, String>,
}

impl DefaultTaxonomyMappingProvider {
    pub fn new(term_mappings: BTreeMap<String, String>) -> Self {
        Self { term_mappings }
    }
}

#[async_trait]
impl TaxonomyMappingProvider for DefaultTaxonomyMappingProvider {
    async fn map_term(
        &self,
        term: &TaxonomyTerm,
        _token: &CancellationToken,
    ) -> Result<Option<TaxonomyTerm>> {
        Ok(match self.term_mappings.get(&term.term_id) {
            Some(target) if target.is_empty() => None,
            Some(target) => Some(TaxonomyTerm {
                label: term.label.clone(),
                term_id: target.clone(),
            }),
            None => Some(term.clone()),
        })
    }
}

/// Renames fields found in the table; other fields keep their name.
#[derive(Debug, Clone, Default)]
pub struct DefaultMetadataMappingProvider {
    field_mappings: BTreeMap<String, String>,
}

impl DefaultMetadataMappingProvider {
    pub fn new(field_mappings: BTreeMap<String, String>) -> Self {
        Self { field_mappings }
    }
}

#[async_trait]
impl MetadataMappingProvider for DefaultMetadataMappingProvider {
    async fn map_field(
        &self,
        name: &str,
        value: &FieldValue,
        _token: &CancellationToken,
    ) -> Result<Option<(String, FieldValue)>> {
        Ok(match self.field_mappings.get(name) {
            Some(target) if target.is_empty() => None,
            Some(target) => Some((target.clone(), value.clone())),
            None => Some((name.to_string(), value.clone())),
        })
    }
}

/// Rewrites URL prefixes.
///
/// Explicit mappings are tried first, in order. Then a URL under the source
/// site, when one is configured, is moved under the target site.
#[derive(Debug, Clone, Default)]
pub struct DefaultUrlMappingProvider {
    mappings: Vec<UrlMapping>,
    source_site_url: Option<String>,
}

impl DefaultUrlMappingProvider {
    pub fn new(mappings: Vec<UrlMapping>) -> Self {
        Self {
            mappings,
            source_site_url: None,
        }
    }

    pub fn from_options(options: &PageTransformationOptions) -> Self {
        let provider = Self::new(options.url_mappings.clone());
        match options.source_site_url.as_deref().map(str::trim) {
            Some(source) if !source.is_empty() => provider.with_source_site(source),
            _ => provider,
        }
    }

    pub fn with_source_site(mut self, source_site_url: impl Into<String>) -> Self {
        self.source_site_url = Some(source_site_url.into());
        self
    }
}

fn replace_prefix(url: &str, prefix: &str, replacement: &str) -> Option<String> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() || url.len() < prefix.len() || !url.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = url.split_at(prefix.len());
    if !head.eq_ignore_ascii_case(prefix) || !(rest.is_empty() || rest.starts_with(['/', '?', '#'])) {
        return None;
    }
    Some(format!("{}{}", replacement.trim_end_matches('/'), rest))
}

#[async_trait]
impl UrlMappingProvider for DefaultUrlMappingProvider {
    async fn map_url(
        &self,
        url: &str,
        context: &PageTransformationContext,
        _token: &CancellationToken,
    ) -> Result<String> {
        for mapping in &self.mappings {
            if let Some(mapped) = replace_prefix(url, &mapping.source, &mapping.target) {
                return Ok(mapped);
            }
        }
        if let Some(source) = &self.source_site_url {
            let target = context.target_context().site_url().as_str();
            if let Some(mapped) = replace_prefix(url, source, target) {
                return Ok(mapped);
            }
        }
        Ok(url.to_string())
    }
}

/// Looks principals up case-insensitively; unknown principals pass through.
#[derive(Debug, Clone, Default)]
pub struct DefaultUserMappingProvider {
    user_mappings: BTreeMap<String, String>,
}

impl DefaultUserMappingProvider {
    pub fn new(user_mappings: BTreeMap<String, String>) -> Self {
        Self { user_mappings }
    }
}

#[async_trait]
impl UserMappingProvider for DefaultUserMappingProvider {
    async fn map_user(&self, principal: &str, _token: &CancellationToken) -> Result<String> {
        Ok(self
            .user_mappings
            .iter()
            .find(|(source, _)| source.eq_ignore_ascii_case(principal))
            .map(|(_, target)| target.clone())
            .unwrap_or_else(|| principal.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_replacement_respects_segment_boundaries() {
        assert_eq!(
            replace_prefix("https://old/sites/a/page", "https://old/sites/a", "https://new/sites/b"),
            Some("https://new/sites/b/page".to_string())
        );
        assert_eq!(
            replace_prefix("https://old/sites/ab", "https://old/sites/a", "https://new"),
            None
        );
    }

    #[tokio::test]
    async fn empty_term_target_drops_term() {
        let provider = DefaultTaxonomyMappingProvider::new(BTreeMap::from([
            ("a".to_string(), String::new()),
            ("b".to_string(), "c".to_string()),
        ]));
        let token = CancellationToken::new();
        let dropped = TaxonomyTerm {
            label: "A".into(),
            term_id: "a".into(),
        };
        let renamed = TaxonomyTerm {
            label: "B".into(),
            term_id: "b".into(),
        };
        assert_eq!(provider.map_term(&dropped, &token).await.unwrap(), None);
        assert_eq!(
            provider.map_term(&renamed, &token).await.unwrap().unwrap().term_id,
            "c"
        );
    }
}
