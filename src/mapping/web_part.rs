use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::contract::{UrlMappingProvider, WebPartMappingProvider};
use crate::error::Result;
use crate::markup::{self, Node};
use crate::model::{properties, PageTransformationContext, WebPartEntity, WebPartType};
use crate::normalizer::{is_empty_paragraph, ContentNormalizer};
use crate::page::CanvasControl;
use crate::tokens::TokenParser;

/// Text written in place of a web part that has no modern counterpart.
pub const UNMAPPED_WEB_PART_TEMPLATE: &str =
    "<p>The web part <strong>{WebPartTitle}</strong> ({WebPartType}) was not transformed.</p>";

const URL_ATTRIBUTES: &[&str] = &["href", "src"];

/// Maps classic web parts onto modern text parts and client-side web parts.
///
/// Rich text goes through URL rewriting and the content normalizer. Images
/// and videos become image and embed parts. Anything else becomes a text
/// part rendered from [`UNMAPPED_WEB_PART_TEMPLATE`].
pub struct DefaultWebPartMappingProvider {
    normalizer: ContentNormalizer,
    url_mapping: Arc<dyn UrlMappingProvider>,
    unmapped_template: String,
}

impl DefaultWebPartMappingProvider {
    pub fn new(url_mapping: Arc<dyn UrlMappingProvider>) -> Self {
        Self {
            normalizer: ContentNormalizer::new(),
            url_mapping,
            unmapped_template: UNMAPPED_WEB_PART_TEMPLATE.to_string(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: ContentNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_unmapped_template(mut self, template: impl Into<String>) -> Self {
        self.unmapped_template = template.into();
        self
    }

    async fn map_url(
        &self,
        url: &str,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<String> {
        if context.options.skip_url_rewrite || url.is_empty() {
            return Ok(url.to_string());
        }
        self.url_mapping.map_url(url, context, token).await
    }

    async fn rewrite_urls(
        &self,
        html: &str,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<String> {
        if context.options.skip_url_rewrite {
            return Ok(html.to_string());
        }
        let nodes = markup::parse_fragment(html);
        let mut urls = Vec::new();
        collect_urls(&nodes, &mut urls);
        let mut mapped = HashMap::with_capacity(urls.len());
        for url in urls {
            if !mapped.contains_key(&url) {
                let target = self.map_url(&url, context, token).await?;
                mapped.insert(url, target);
            }
        }
        Ok(markup::serialize(&apply_urls(nodes, &mapped)))
    }

    async fn text_control(
        &self,
        html: &str,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<Vec<CanvasControl>> {
        let rewritten = self.rewrite_urls(html, context, token).await?;
        let normalized = self
            .normalizer
            .transform(&rewritten, context.options.use_image_placeholders);
        if is_empty_paragraph(normalized.trim()) {
            return Ok(Vec::new());
        }
        Ok(vec![CanvasControl::Text { html: normalized }])
    }

    fn unmapped_control(
        &self,
        web_part: &WebPartEntity,
        context: &PageTransformationContext,
    ) -> CanvasControl {
        let parser = TokenParser::new(context.options.mapping_properties.clone())
            .with("WebPartTitle", web_part.title.clone())
            .with("WebPartType", format!("{:?}", web_part.web_part_type));
        CanvasControl::Text {
            html: parser.replace_tokens(&self.unmapped_template),
        }
    }
}

fn collect_urls(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        if let Node::Element(el) = node {
            for name in URL_ATTRIBUTES {
                if let Some(value) = el.attr(name) {
                    out.push(value.to_string());
                }
            }
            collect_urls(&el.children, out);
        }
    }
}

fn apply_urls(nodes: Vec<Node>, mapped: &HashMap<String, String>) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(mut el) => {
                for name in URL_ATTRIBUTES {
                    if let Some(target) = el.attr(name).and_then(|v| mapped.get(v)).cloned() {
                        el.set_attr(name, target);
                    }
                }
                el.children = apply_urls(el.children, mapped);
                Node::Element(el)
            }
            other => other,
        })
        .collect()
}

fn web_part(
    web_part_type: &str,
    title: &str,
    properties: BTreeMap<String, String>,
) -> CanvasControl {
    CanvasControl::WebPart {
        web_part_type: web_part_type.to_string(),
        title: title.to_string(),
        properties,
    }
}

#[async_trait]
impl WebPartMappingProvider for DefaultWebPartMappingProvider {
    async fn map_web_part(
        &self,
        wp: &WebPartEntity,
        context: &PageTransformationContext,
        token: &CancellationToken,
    ) -> Result<Vec<CanvasControl>> {
        let controls = match wp.web_part_type {
            WebPartType::WikiText => {
                let html = wp.property(properties::TEXT).unwrap_or_default();
                self.text_control(html, context, token).await?
            }
            WebPartType::ContentEditor
                if wp.property(properties::CONTENT_LINK).map_or(true, str::is_empty) =>
            {
                let html = wp.property(properties::CONTENT).unwrap_or_default();
                self.text_control(html, context, token).await?
            }
            WebPartType::WikiImage | WebPartType::Image => {
                let Some(source) = wp.property(properties::IMAGE_URL).filter(|s| !s.is_empty())
                else {
                    warn!(title = %wp.title, "[MAPPING] Image web part without source, skipped");
                    return Ok(Vec::new());
                };
                let mut props = BTreeMap::new();
                props.insert(
                    "imageSourceUrl".to_string(),
                    self.map_url(source, context, token).await?,
                );
                if let Some(alt) = wp.property(properties::ALTERNATIVE_TEXT) {
                    props.insert("altText".to_string(), alt.to_string());
                }
                if let Some(anchor) = wp.property(properties::ANCHOR) {
                    props.insert(
                        "linkUrl".to_string(),
                        self.map_url(anchor, context, token).await?,
                    );
                }
                if let Some(caption) = wp.property(properties::CAPTION) {
                    props.insert("captionText".to_string(), caption.to_string());
                }
                vec![web_part("Image", &wp.title, props)]
            }
            WebPartType::WikiVideo => {
                let mut props = BTreeMap::new();
                if let Some(embed) = wp.property(properties::IFRAME_EMBED) {
                    props.insert("embedCode".to_string(), embed.to_string());
                }
                if let Some(source) = wp.property(properties::SOURCE) {
                    props.insert("sourceUrl".to_string(), source.to_string());
                }
                vec![web_part("ContentEmbed", &wp.title, props)]
            }
            WebPartType::ListView | WebPartType::XsltListView => {
                vec![web_part("List", &wp.title, wp.properties.clone())]
            }
            WebPartType::SummaryLinks => {
                vec![web_part("QuickLinks", &wp.title, wp.properties.clone())]
            }
            WebPartType::ContentByQuery => {
                vec![web_part("HighlightedContent", &wp.title, wp.properties.clone())]
            }
            _ => vec![self.unmapped_control(wp, context)],
        };
        debug!(
            web_part_type = ?wp.web_part_type,
            controls = controls.len(),
            "[MAPPING] Web part mapped"
        );
        Ok(controls)
    }
}
