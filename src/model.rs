//! Source-side data model: the classic page being transformed, its placed
//! web parts, and the task/context values that carry one page through the
//! pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::contract::{SourceProvider, TargetContext};
use crate::options::PageTransformationOptions;

/// Well-known keys of the [`WebPartEntity::properties`] bag.
pub mod properties {
    pub const TEXT: &str = "Text";
    pub const CONTENT: &str = "Content";
    pub const CONTENT_LINK: &str = "ContentLink";
    pub const IMAGE_URL: &str = "ImageUrl";
    pub const ALTERNATIVE_TEXT: &str = "AlternativeText";
    pub const ANCHOR: &str = "Anchor";
    pub const CAPTION: &str = "Caption";
    pub const IFRAME_EMBED: &str = "IFrameEmbed";
    pub const SOURCE: &str = "Source";
}

/// Identifier of one source page, as handed out by a [`SourceProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceItemId(String);

impl SourceItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Kind of classic page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourcePageKind {
    #[default]
    WikiPage,
    WebPartPage,
    PublishingPage,
}

/// One metadata value of a source or target page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    User(String),
    Taxonomy(Vec<TaxonomyTerm>),
}

/// A managed-metadata term reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyTerm {
    pub label: String,
    pub term_id: String,
}

/// A unique permission granted on the source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub principal: String,
    pub role: String,
}

/// A classic page read from the source, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub id: SourceItemId,
    /// File name of the page, e.g. `Home.aspx`.
    pub name: String,
    /// Server-relative or absolute URL of the source page.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub kind: SourcePageKind,
    /// Wiki layout name (`OneColumn`, `TwoColumnsHeader`, ...) or publishing page layout.
    #[serde(default)]
    pub page_layout: Option<String>,
    #[serde(default)]
    pub web_parts: Vec<WebPartEntity>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub editor: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_home_page: bool,
    #[serde(default)]
    pub role_assignments: Vec<RoleAssignment>,
}

impl SourceItem {
    /// Page name without the `.aspx` extension.
    pub fn base_name(&self) -> &str {
        let name = self.name.as_str();
        match name.len().checked_sub(5) {
            Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".aspx") => {
                &name[..cut]
            }
            _ => name,
        }
    }
}

/// Type tag of a placed content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebPartType {
    WikiText,
    WikiImage,
    WikiVideo,
    ContentEditor,
    ScriptEditor,
    Image,
    PageViewer,
    ListView,
    XsltListView,
    SummaryLinks,
    ContentByQuery,
    #[serde(other)]
    Unknown,
}

impl WebPartType {
    pub fn is_image(&self) -> bool {
        matches!(self, WebPartType::WikiImage | WebPartType::Image)
    }
}

/// One placed content block on a source page.
///
/// `(row, column, order)` locates the block on the page grid; `order` breaks
/// ties inside one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebPartEntity {
    #[serde(rename = "type")]
    pub web_part_type: WebPartType,
    #[serde(default)]
    pub title: String,
    pub row: u32,
    pub column: u32,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl WebPartEntity {
    pub fn new(web_part_type: WebPartType, row: u32, column: u32, order: u32) -> Self {
        Self {
            web_part_type,
            title: String::new(),
            row,
            column,
            order,
            hidden: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Sort key placing the web part on the page grid.
    pub fn placement(&self) -> (u32, u32, u32) {
        (self.row, self.column, self.order)
    }
}

/// Unit of work: one source item to transform into one target page.
///
/// Built once by a distiller and never mutated afterwards.
#[derive(Clone)]
pub struct PageTransformationTask {
    id: Uuid,
    source_provider: Arc<dyn SourceProvider>,
    source_item_id: SourceItemId,
    target_context: Arc<dyn TargetContext>,
    target_page_uri: Option<Url>,
}

impl PageTransformationTask {
    pub fn new(
        source_provider: Arc<dyn SourceProvider>,
        source_item_id: SourceItemId,
        target_context: Arc<dyn TargetContext>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_provider,
            source_item_id,
            target_context,
            target_page_uri: None,
        }
    }

    /// Pins the target page URI, bypassing the URI resolver.
    pub fn with_target_page_uri(mut self, uri: Url) -> Self {
        self.target_page_uri = Some(uri);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_provider(&self) -> &Arc<dyn SourceProvider> {
        &self.source_provider
    }

    pub fn source_item_id(&self) -> &SourceItemId {
        &self.source_item_id
    }

    pub fn target_context(&self) -> &Arc<dyn TargetContext> {
        &self.target_context
    }

    pub fn target_page_uri(&self) -> Option<&Url> {
        self.target_page_uri.as_ref()
    }
}

impl fmt::Debug for PageTransformationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTransformationTask")
            .field("id", &self.id)
            .field("source_item_id", &self.source_item_id)
            .field("target_page_uri", &self.target_page_uri)
            .finish_non_exhaustive()
    }
}

/// Everything the mapping, generation and hook stages see for one task.
#[derive(Debug, Clone)]
pub struct PageTransformationContext {
    pub task: PageTransformationTask,
    pub source_item: SourceItem,
    pub target_page_uri: Url,
    pub options: Arc<PageTransformationOptions>,
}

impl PageTransformationContext {
    pub fn target_context(&self) -> &Arc<dyn TargetContext> {
        self.task.target_context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_aspx_case_insensitively() {
        let item = SourceItem {
            id: "1".into(),
            name: "Home.ASPX".to_string(),
            url: String::new(),
            title: None,
            kind: SourcePageKind::WikiPage,
            page_layout: None,
            web_parts: vec![],
            fields: BTreeMap::new(),
            author: None,
            editor: None,
            created: None,
            modified: None,
            is_home_page: false,
            role_assignments: vec![],
        };
        assert_eq!(item.base_name(), "Home");
    }

    #[test]
    fn web_part_type_deserializes_unknown_tags() {
        let wp: WebPartEntity =
            serde_json::from_str(r#"{"type":"Calendar","row":1,"column":1}"#).unwrap();
        assert_eq!(wp.web_part_type, WebPartType::Unknown);
        assert_eq!(wp.order, 0);
    }
}
