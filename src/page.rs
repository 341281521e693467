//! Target-side model: modern page sections, columns, controls and the
//! values passed between the mapping and generation stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::FieldValue;

/// Canvas template of a modern page section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanvasSectionTemplate {
    OneColumn,
    OneColumnFullWidth,
    TwoColumn,
    ThreeColumn,
    TwoColumnLeft,
    TwoColumnRight,
    OneColumnVerticalSection,
    TwoColumnVerticalSection,
    ThreeColumnVerticalSection,
    TwoColumnLeftVerticalSection,
    TwoColumnRightVerticalSection,
}

impl CanvasSectionTemplate {
    /// Number of regular (non-vertical) columns.
    pub fn column_count(&self) -> u32 {
        use CanvasSectionTemplate::*;
        match self {
            OneColumn | OneColumnFullWidth | OneColumnVerticalSection => 1,
            TwoColumn | TwoColumnLeft | TwoColumnRight | TwoColumnVerticalSection
            | TwoColumnLeftVerticalSection | TwoColumnRightVerticalSection => 2,
            ThreeColumn | ThreeColumnVerticalSection => 3,
        }
    }

    pub fn has_vertical_section(&self) -> bool {
        use CanvasSectionTemplate::*;
        matches!(
            self,
            OneColumnVerticalSection
                | TwoColumnVerticalSection
                | ThreeColumnVerticalSection
                | TwoColumnLeftVerticalSection
                | TwoColumnRightVerticalSection
        )
    }
}

/// A content block placed in a modern page column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CanvasControl {
    /// Rich text part holding normalized markup.
    Text { html: String },
    /// Client-side web part.
    WebPart {
        web_part_type: String,
        title: String,
        #[serde(default)]
        properties: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// 1-based position within the section.
    pub order: u32,
    #[serde(default)]
    pub is_vertical_section: bool,
    #[serde(default)]
    pub controls: Vec<CanvasControl>,
}

impl Column {
    pub fn new(order: u32, is_vertical_section: bool) -> Self {
        Self {
            order,
            is_vertical_section,
            controls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// 1-based position on the page.
    pub order: u32,
    pub template: CanvasSectionTemplate,
    #[serde(default)]
    pub zone_emphasis: u32,
    #[serde(default)]
    pub vertical_section_emphasis: Option<u32>,
    /// Source grid row this section was derived from.
    #[serde(default)]
    pub source_row: Option<u32>,
    pub columns: Vec<Column>,
}

impl Section {
    /// Builds an empty section with one column per template slot, the vertical section last.
    pub fn empty(order: u32, template: CanvasSectionTemplate, source_row: Option<u32>) -> Self {
        let mut columns: Vec<Column> = (1..=template.column_count())
            .map(|order| Column::new(order, false))
            .collect();
        if template.has_vertical_section() {
            columns.push(Column::new(template.column_count() + 1, true));
        }
        Self {
            order,
            template,
            zone_emphasis: 0,
            vertical_section_emphasis: None,
            source_row,
            columns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(|c| c.controls.is_empty())
    }

    pub fn vertical_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_vertical_section)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageHeaderKind {
    #[default]
    None,
    Default,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageHeaderLayout {
    #[default]
    FullWidthImage,
    NoImage,
    ColorBlock,
    CutInShape,
}

/// Header requested by the mapping stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageHeaderDescriptor {
    pub kind: PageHeaderKind,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub alternative_text: Option<String>,
    #[serde(default)]
    pub translate_x: Option<f64>,
    #[serde(default)]
    pub translate_y: Option<f64>,
    #[serde(default)]
    pub show_published_date: bool,
}

/// User resolved against the target user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    pub id: i64,
    pub login_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Header as written on the generated page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageHeader {
    pub kind: PageHeaderKind,
    pub layout: PageHeaderLayout,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub alternative_text: Option<String>,
    #[serde(default)]
    pub translate_x: Option<f64>,
    #[serde(default)]
    pub translate_y: Option<f64>,
    #[serde(default)]
    pub show_published_date: bool,
    #[serde(default)]
    pub authors: Vec<TargetUser>,
}

impl From<&PageHeaderDescriptor> for PageHeader {
    fn from(d: &PageHeaderDescriptor) -> Self {
        Self {
            kind: d.kind,
            layout: PageHeaderLayout::FullWidthImage,
            image_url: d.image_url.clone(),
            alternative_text: d.alternative_text.clone(),
            translate_x: d.translate_x,
            translate_y: d.translate_y,
            show_published_date: d.show_published_date,
            authors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageLayoutType {
    #[default]
    Article,
    Home,
}

/// The modern page handed to the target store for saving.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientSidePage {
    /// File name, e.g. `Migrated_Home.aspx`.
    pub name: String,
    /// Folder below the site pages library, empty for the root.
    #[serde(default)]
    pub folder: String,
    pub title: String,
    pub layout: PageLayoutType,
    pub header: PageHeader,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub comments_disabled: bool,
}

impl ClientSidePage {
    pub fn new(name: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            ..Default::default()
        }
    }

    /// Stock home page used when a source home page is replaced instead of transformed.
    pub fn default_home_page(name: impl Into<String>, folder: impl Into<String>) -> Self {
        let mut page = Self::new(name, folder);
        page.layout = PageLayoutType::Home;
        page.header = PageHeader {
            kind: PageHeaderKind::None,
            ..Default::default()
        };

        let mut hero = Section::empty(1, CanvasSectionTemplate::OneColumnFullWidth, None);
        hero.columns[0].controls.push(CanvasControl::WebPart {
            web_part_type: "Hero".to_string(),
            title: "Hero".to_string(),
            properties: BTreeMap::new(),
        });

        let mut news = Section::empty(2, CanvasSectionTemplate::TwoColumnLeft, None);
        news.columns[0].controls.push(CanvasControl::WebPart {
            web_part_type: "NewsReel".to_string(),
            title: "News".to_string(),
            properties: BTreeMap::new(),
        });
        news.columns[1].controls.push(CanvasControl::WebPart {
            web_part_type: "QuickLinks".to_string(),
            title: "Quick links".to_string(),
            properties: BTreeMap::new(),
        });
        news.columns[1].controls.push(CanvasControl::WebPart {
            web_part_type: "SiteActivity".to_string(),
            title: "Activity".to_string(),
            properties: BTreeMap::new(),
        });

        page.sections = vec![hero, news];
        page
    }
}

/// Aggregate result of the mapping stage, built once per task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MappingProviderOutput {
    pub title: String,
    pub header: PageHeaderDescriptor,
    pub sections: Vec<Section>,
    /// Mapped principal of the source page author.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub is_home_page: bool,
    /// Target metadata, already passed through field, taxonomy and user mapping.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub telemetry_properties: BTreeMap<String, String>,
}

/// Result of page generation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeneratorOutput {
    pub generated_page_url: Url,
    pub telemetry_properties: BTreeMap<String, String>,
}
