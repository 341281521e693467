use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::{
    MappingProvider, MetadataMappingProvider, PageLayoutMappingProvider, TaxonomyMappingProvider,
    UserMappingProvider, WebPartMappingProvider,
};
use crate::error::{Result, TransformationError};
use crate::layout::{column_slot, LayoutTransformer};
use crate::model::{FieldValue, PageTransformationContext, WebPartEntity};
use crate::options::PageTransformationOptions;
use crate::page::{MappingProviderOutput, PageHeaderDescriptor, PageHeaderKind, Section};
use crate::splitter::WikiSplitter;

use super::{
    DefaultMetadataMappingProvider, DefaultPageLayoutMappingProvider,
    DefaultTaxonomyMappingProvider, DefaultUrlMappingProvider, DefaultUserMappingProvider,
    DefaultWebPartMappingProvider,
};

/// Source field holding the image of a custom page header.
const HEADER_IMAGE_FIELD: &str = "PublishingPageImage";

/// Maps a classic page: splits wiki text, derives sections from the layout,
/// places mapped web parts and carries metadata over.
pub struct ClassicPageMappingProvider {
    web_part: Arc<dyn WebPartMappingProvider>,
    page_layout: Arc<dyn PageLayoutMappingProvider>,
    taxonomy: Arc<dyn TaxonomyMappingProvider>,
    metadata: Arc<dyn MetadataMappingProvider>,
    user: Arc<dyn UserMappingProvider>,
    layout: LayoutTransformer,
}

impl ClassicPageMappingProvider {
    /// Wires the table-driven default providers from `options`.
    pub fn new(options: &PageTransformationOptions) -> Self {
        let url = Arc::new(DefaultUrlMappingProvider::from_options(options));
        Self {
            web_part: Arc::new(DefaultWebPartMappingProvider::new(url)),
            page_layout: Arc::new(DefaultPageLayoutMappingProvider),
            taxonomy: Arc::new(DefaultTaxonomyMappingProvider::new(
                options.term_mappings.clone(),
            )),
            metadata: Arc::new(DefaultMetadataMappingProvider::new(
                options.metadata_field_mappings.clone(),
            )),
            user: Arc::new(DefaultUserMappingProvider::new(options.user_mappings.clone())),
            layout: LayoutTransformer::new(),
        }
    }

    pub fn with_web_part_mapping(mut self, provider: Arc<dyn WebPartMappingProvider>) -> Self {
        self.web_part = provider;
        self
    }

    pub fn with_page_layout_mapping(
        mut self,
        provider: Arc<dyn PageLayoutMappingProvider>,
    ) -> Self {
        self.page_layout = provider;
        self
    }

    pub fn with_taxonomy_mapping(mut self, provider: Arc<dyn TaxonomyMappingProvider>) -> Self {
        self.taxonomy = provider;
        self
    }

    pub fn with_metadata_mapping(mut self, provider: Arc<dyn MetadataMappingProvider>) -> Self {
        self.metadata = provider;
        self
    }

    pub fn with_user_mapping(mut self, provider: Arc<dyn UserMappingProvider>) -> Self {
        self.user = provider;
        self
    }

    async fn place_web_parts(
        &self,
        sections: &mut [Section],
        web_parts: &[WebPartEntity],
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<()> {
        for wp in web_parts {
            if token.is_cancelled() {
                return Err(TransformationError::Cancelled);
            }
            let controls = self
                .web_part
                .map_web_part(wp, context, token)
                .await
                .map_err(|e| match e {
                    TransformationError::Cancelled => e,
                    e => TransformationError::mapping("web part", e),
                })?;
            if controls.is_empty() {
                continue;
            }
            let Some(section) = sections
                .iter_mut()
                .find(|s| s.source_row == Some(wp.row))
            else {
                warn!(row = wp.row, "[MAPPING] No section for web part row, skipped");
                continue;
            };
            let slot = column_slot(section, wp.column);
            section.columns[slot].controls.extend(controls);
        }
        Ok(())
    }

    async fn map_fields(
        &self,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<BTreeMap<String, FieldValue>> {
        let item = &context.source_item;
        let options = &context.options;
        let mut fields = BTreeMap::new();

        if options.copy_page_metadata {
            for (name, value) in &item.fields {
                let Some((target, value)) = self.metadata.map_field(name, value, token).await?
                else {
                    debug!(field = %name, "[MAPPING] Field dropped by metadata mapping");
                    continue;
                };
                let value = match value {
                    FieldValue::Taxonomy(terms) => {
                        let mut mapped = Vec::with_capacity(terms.len());
                        for term in &terms {
                            if let Some(term) = self.taxonomy.map_term(term, token).await? {
                                mapped.push(term);
                            }
                        }
                        FieldValue::Taxonomy(mapped)
                    }
                    FieldValue::User(principal) => {
                        FieldValue::User(self.user.map_user(&principal, token).await?)
                    }
                    other => other,
                };
                fields.insert(target, value);
            }
        }

        if options.keep_page_creation_modification_information {
            if let Some(created) = item.created {
                fields.insert("Created".to_string(), FieldValue::DateTime(created));
            }
            if let Some(modified) = item.modified {
                fields.insert("Modified".to_string(), FieldValue::DateTime(modified));
            }
            if let Some(author) = &item.author {
                let author = self.user.map_user(author, token).await?;
                fields.insert("Author".to_string(), FieldValue::User(author));
            }
            if let Some(editor) = &item.editor {
                let editor = self.user.map_user(editor, token).await?;
                fields.insert("Editor".to_string(), FieldValue::User(editor));
            }
        }
        Ok(fields)
    }
}

fn header_descriptor(context: &PageTransformationContext) -> PageHeaderDescriptor {
    let kind = context.options.page_header;
    let image_url = match (kind, context.source_item.fields.get(HEADER_IMAGE_FIELD)) {
        (PageHeaderKind::Custom, Some(FieldValue::Text(url))) if !url.is_empty() => {
            Some(url.clone())
        }
        _ => None,
    };
    PageHeaderDescriptor {
        kind,
        image_url,
        ..Default::default()
    }
}

/// Drops sections without controls and renumbers the rest from 1.
pub(crate) fn remove_empty_sections(sections: Vec<Section>) -> Vec<Section> {
    sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(index, mut section)| {
            section.order = index as u32 + 1;
            section
        })
        .collect()
}

#[async_trait]
impl MappingProvider for ClassicPageMappingProvider {
    async fn map(
        &self,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<MappingProviderOutput> {
        let item = &context.source_item;
        let options = &context.options;

        let mut web_parts: Vec<WebPartEntity> = item
            .web_parts
            .iter()
            .filter(|wp| !(options.skip_hidden_web_parts && wp.hidden))
            .cloned()
            .collect();
        web_parts.sort_by_key(WebPartEntity::placement);
        let web_parts = WikiSplitter::new(options).transform_plus_split(web_parts);

        let descriptor = self.page_layout.map_page_layout(context, token).await?;
        let mut sections = self.layout.transform(&descriptor, descriptor.kind, &web_parts)?;
        self.place_web_parts(&mut sections, &web_parts, context, token)
            .await?;
        if options.remove_empty_sections_and_columns {
            sections = remove_empty_sections(sections);
        }

        let author = match &item.author {
            Some(author) => Some(self.user.map_user(author, token).await?),
            None => None,
        };
        let fields = self.map_fields(context, token).await?;

        let mut telemetry_properties = BTreeMap::new();
        telemetry_properties.insert("SourcePageKind".to_string(), format!("{:?}", item.kind));
        telemetry_properties.insert("PageLayout".to_string(), descriptor.name.clone());
        telemetry_properties.insert("WebPartCount".to_string(), web_parts.len().to_string());
        telemetry_properties.insert("SectionCount".to_string(), sections.len().to_string());

        info!(
            source_item_id = %item.id,
            sections = sections.len(),
            web_parts = web_parts.len(),
            "[MAPPING] Classic page mapped"
        );

        Ok(MappingProviderOutput {
            title: item
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| item.base_name().to_string()),
            header: header_descriptor(context),
            sections,
            author,
            is_home_page: item.is_home_page,
            fields,
            telemetry_properties,
        })
    }
}
