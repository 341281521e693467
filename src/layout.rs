//! Layout transformer: turns the web-part placement grid of a classic page
//! into ordered modern sections.
//!
//! Rows are visited from the lowest to the highest row number; rows without
//! web parts are skipped and do not consume a section number. The column
//! count of a row picks the canvas template. Two-column rows consult
//! [`two_column_template`], a decision table keyed by where the image-only
//! columns are.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TransformationError};
use crate::model::WebPartEntity;
use crate::page::{CanvasSectionTemplate, Section};

/// Maximum number of regular columns a modern section can hold.
pub const MAX_SECTION_COLUMNS: u32 = 3;

/// Origin of the source page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageLayoutKind {
    #[default]
    Wiki,
    WebPart,
    Publishing,
}

/// Describes the source page layout as seen by the layout transformer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageLayoutDescriptor {
    pub name: String,
    pub kind: PageLayoutKind,
    /// The right-most column of the first row becomes a vertical section.
    #[serde(default)]
    pub vertical_column: bool,
    #[serde(default)]
    pub vertical_column_emphasis: Option<u32>,
    /// Zone emphasis per source row; rows not listed get 0.
    #[serde(default)]
    pub row_emphasis: BTreeMap<u32, u32>,
}

impl PageLayoutDescriptor {
    pub fn new(name: impl Into<String>, kind: PageLayoutKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_vertical_column(mut self, emphasis: Option<u32>) -> Self {
        self.vertical_column = true;
        self.vertical_column_emphasis = emphasis;
        self
    }

    pub fn with_row_emphasis(mut self, row: u32, emphasis: u32) -> Self {
        self.row_emphasis.insert(row, emphasis);
        self
    }
}

/// Which side of a two-column row holds a single image web part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePlacement {
    LeftOnly,
    RightOnly,
    Both,
    Neither,
}

impl ImagePlacement {
    fn of(left_is_image: bool, right_is_image: bool) -> Self {
        match (left_is_image, right_is_image) {
            (true, false) => ImagePlacement::LeftOnly,
            (false, true) => ImagePlacement::RightOnly,
            (true, true) => ImagePlacement::Both,
            (false, false) => ImagePlacement::Neither,
        }
    }
}

/// Picks the two-column template: the image side gets the narrow column.
pub fn two_column_template(placement: ImagePlacement, vertical: bool) -> CanvasSectionTemplate {
    use CanvasSectionTemplate::*;
    match (placement, vertical) {
        (ImagePlacement::LeftOnly, false) => TwoColumnRight,
        (ImagePlacement::LeftOnly, true) => TwoColumnRightVerticalSection,
        (ImagePlacement::RightOnly, false) => TwoColumnLeft,
        (ImagePlacement::RightOnly, true) => TwoColumnLeftVerticalSection,
        (ImagePlacement::Both | ImagePlacement::Neither, false) => TwoColumn,
        (ImagePlacement::Both | ImagePlacement::Neither, true) => TwoColumnVerticalSection,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutTransformer;

impl LayoutTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Builds one empty section per populated source row.
    pub fn transform(
        &self,
        descriptor: &PageLayoutDescriptor,
        kind: PageLayoutKind,
        web_parts: &[WebPartEntity],
    ) -> Result<Vec<Section>> {
        if web_parts.is_empty() {
            debug!(layout = %descriptor.name, "[LAYOUT] No web parts, emitting one empty section");
            return Ok(vec![Section::empty(1, CanvasSectionTemplate::OneColumn, None)]);
        }

        let mut rows: BTreeMap<u32, Vec<&WebPartEntity>> = BTreeMap::new();
        for wp in web_parts {
            rows.entry(wp.row).or_default().push(wp);
        }

        let mut sections = Vec::new();
        let mut order = 0;
        for (row, in_row) in rows {
            let Some(max_column) = in_row.iter().map(|wp| wp.column).max() else {
                continue;
            };

            let vertical = descriptor.vertical_column && order == 0 && max_column > 1;
            let columns = if vertical { max_column - 1 } else { max_column };
            if columns > MAX_SECTION_COLUMNS {
                return Err(TransformationError::TooManyColumns { row, columns });
            }

            let template = match columns {
                0 | 1 if vertical => CanvasSectionTemplate::OneColumnVerticalSection,
                0 | 1 => CanvasSectionTemplate::OneColumn,
                2 => two_column_template(
                    ImagePlacement::of(
                        is_single_image(&in_row, 1),
                        is_single_image(&in_row, 2),
                    ),
                    vertical,
                ),
                _ if vertical => CanvasSectionTemplate::ThreeColumnVerticalSection,
                _ => CanvasSectionTemplate::ThreeColumn,
            };

            order += 1;
            let mut section = Section::empty(order, template, Some(row));
            section.zone_emphasis = descriptor.row_emphasis.get(&row).copied().unwrap_or(0);
            if vertical {
                section.vertical_section_emphasis =
                    Some(descriptor.vertical_column_emphasis.unwrap_or(0));
            }
            debug!(
                row,
                order,
                ?template,
                ?kind,
                "[LAYOUT] Section derived from source row"
            );
            sections.push(section);
        }
        Ok(sections)
    }
}

fn is_single_image(in_row: &[&WebPartEntity], column: u32) -> bool {
    let mut in_column = in_row.iter().filter(|wp| wp.column == column);
    matches!(
        (in_column.next(), in_column.next()),
        (Some(wp), None) if wp.web_part_type.is_image()
    )
}

/// Index of the column in `section` that receives web parts from `source_column`.
///
/// The column right of the last regular column lands in the vertical section
/// when there is one; anything further right is clamped to the last column.
pub fn column_slot(section: &Section, source_column: u32) -> usize {
    let regular = section.template.column_count();
    if section.template.has_vertical_section() && source_column > regular {
        return section.columns.len() - 1;
    }
    (source_column.clamp(1, regular) - 1) as usize
}
