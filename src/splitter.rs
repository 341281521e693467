//! Wiki splitter: breaks wiki text around embedded images and videos so each
//! medium becomes its own web part.
//!
//! Every image or iframe that can be lifted out is replaced by a split marker,
//! the serialized text is cut on that marker, and each fragment is re-parsed
//! so unbalanced tags are closed again.
//!
//! Once anything on a page is split, every entity's order is multiplied by
//! [`ORDER_HEADROOM`] (or by the largest part count, if bigger) and the parts
//! of an entity take consecutive orders from there. `(row, column, order)`
//! stays unique and keeps the source order. Orders too large to scale are
//! renumbered densely per cell first.
//!
//! Media inside tables or lists cannot be lifted without breaking the
//! surrounding structure. Those stay in the text and, when
//! `add_table_list_image_as_image_web_part` is set, are also appended as
//! web parts after everything else on the page.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::markup::{self, Element, Node};
use crate::model::{properties, WebPartEntity, WebPartType};
use crate::options::PageTransformationOptions;

pub const SPLIT_MARKER: &str = r#"<span class="split"></span>"#;

/// Multiplier applied to every order on a page that has split entities.
pub const ORDER_HEADROOM: u32 = 1000;

const UNSPLITTABLE: &[&str] = &["table", "thead", "tbody", "tfoot", "tr", "td", "th", "ul", "ol", "li"];

const EMPTY_BLOCKS: &[&str] = &["p", "div", "span", "h2", "h3", "h4", "blockquote", "strong", "em"];

#[derive(Debug, Clone)]
struct Media {
    web_part_type: WebPartType,
    properties: Vec<(&'static str, String)>,
}

impl Media {
    fn into_entity(self, row: u32, column: u32, order: u32) -> WebPartEntity {
        self.properties.into_iter().fold(
            WebPartEntity::new(self.web_part_type, row, column, order),
            |wp, (key, value)| wp.with_property(key, value),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WikiSplitter {
    handle_wiki_images_and_videos: bool,
    add_table_list_image_as_image_web_part: bool,
}

impl WikiSplitter {
    pub fn new(options: &PageTransformationOptions) -> Self {
        Self {
            handle_wiki_images_and_videos: options.handle_wiki_images_and_videos,
            add_table_list_image_as_image_web_part: options.add_table_list_image_as_image_web_part,
        }
    }

    pub fn transform_plus_split(&self, web_parts: Vec<WebPartEntity>) -> Vec<WebPartEntity> {
        if !self.handle_wiki_images_and_videos {
            return web_parts;
        }

        let mut expansions = Vec::with_capacity(web_parts.len());
        let mut trapped = Vec::new();
        for wp in web_parts {
            let (expansion, stuck) = self.expand(wp);
            if self.add_table_list_image_as_image_web_part {
                trapped.extend(stuck);
            }
            expansions.push(expansion);
        }

        if trapped.is_empty() && !expansions.iter().any(|e| e.split) {
            return expansions.into_iter().flat_map(|e| e.parts).collect();
        }

        let headroom = expansions
            .iter()
            .map(|e| u32::try_from(e.parts.len()).unwrap_or(u32::MAX))
            .fold(ORDER_HEADROOM, u32::max);
        let bases = rebase(&expansions, headroom);
        let mut tail = TailCounter::seeded_from(&expansions, &bases, headroom);

        let mut out = Vec::with_capacity(expansions.len() + trapped.len());
        for (expansion, base) in expansions.into_iter().zip(bases) {
            for (offset, mut part) in (0u32..).zip(expansion.parts) {
                part.order = base.saturating_add(offset);
                out.push(part);
            }
        }
        for media in trapped {
            let (row, column, order) = tail.next();
            out.push(media.into_entity(row, column, order));
        }
        out
    }

    /// Splits one entity around its liftable media. Also returns the media
    /// that is trapped inside tables or lists.
    fn expand(&self, wp: WebPartEntity) -> (Expansion, Vec<Media>) {
        let Some(key) = splittable_property(&wp) else {
            return (Expansion::whole(wp), Vec::new());
        };
        let nodes = markup::parse_fragment(wp.property(key).unwrap_or_default());
        if !markup::contains(&nodes, &is_media) {
            return (Expansion::whole(wp), Vec::new());
        }

        let mut lifted = Vec::new();
        let mut trapped = Vec::new();
        let marked = mark_media(nodes, false, &mut lifted, &mut trapped);
        if lifted.is_empty() {
            return (Expansion::whole(wp), trapped);
        }

        debug!(
            row = wp.row,
            column = wp.column,
            media = lifted.len(),
            "[SPLIT] Splitting wiki text around media"
        );
        let serialized = markup::serialize(&marked);
        let fragments: Vec<&str> = serialized.split(SPLIT_MARKER).collect();
        let text_part =
            |fragment: &str| clean_fragment(fragment).map(|text| wp.clone().with_property(key, text));

        let count = lifted.len();
        let mut parts = Vec::with_capacity(fragments.len() + count);
        for (fragment, media) in fragments.iter().zip(lifted) {
            parts.extend(text_part(fragment));
            parts.push(media.into_entity(wp.row, wp.column, wp.order));
        }
        if let Some(last) = fragments.get(count) {
            parts.extend(text_part(last));
        }

        let expansion = Expansion {
            row: wp.row,
            column: wp.column,
            order: wp.order,
            split: true,
            parts,
        };
        (expansion, trapped)
    }
}

/// The entities one source entity turned into, still carrying its placement.
struct Expansion {
    row: u32,
    column: u32,
    order: u32,
    split: bool,
    parts: Vec<WebPartEntity>,
}

impl Expansion {
    fn whole(wp: WebPartEntity) -> Self {
        Self {
            row: wp.row,
            column: wp.column,
            order: wp.order,
            split: false,
            parts: vec![wp],
        }
    }
}

/// First order of each expansion: its source order times `headroom`.
///
/// When that would overflow, orders are first renumbered densely per cell,
/// keeping their relative order.
fn rebase(expansions: &[Expansion], headroom: u32) -> Vec<u32> {
    let max_order = expansions.iter().map(|e| e.order).max().unwrap_or(0);
    let fits = max_order
        .checked_add(1)
        .and_then(|o| o.checked_mul(headroom))
        .is_some();
    if fits {
        return expansions.iter().map(|e| e.order * headroom).collect();
    }

    let mut cells: BTreeMap<(u32, u32), BTreeSet<u32>> = BTreeMap::new();
    for e in expansions {
        cells.entry((e.row, e.column)).or_default().insert(e.order);
    }
    expansions
        .iter()
        .map(|e| {
            let rank = cells
                .get(&(e.row, e.column))
                .map_or(0, |orders| orders.range(..e.order).count());
            u32::try_from(rank)
                .unwrap_or(u32::MAX)
                .saturating_mul(headroom)
        })
        .collect()
}

/// Property holding splittable markup, if the entity is splittable at all.
fn splittable_property(wp: &WebPartEntity) -> Option<&'static str> {
    match wp.web_part_type {
        WebPartType::WikiText => Some(properties::TEXT),
        WebPartType::ContentEditor
            if wp.property(properties::CONTENT_LINK).map_or(true, str::is_empty)
                && wp.property(properties::CONTENT).is_some_and(|c| !c.trim().is_empty()) =>
        {
            Some(properties::CONTENT)
        }
        _ => None,
    }
}

fn is_media(el: &Element) -> bool {
    el.is("img") || el.is("iframe")
}

/// Image being the only element child of an anchor.
fn anchored_image(anchor: &Element) -> Option<&Element> {
    if !anchor.is("a") {
        return None;
    }
    let mut elements = anchor.children.iter().filter_map(Node::as_element);
    match (elements.next(), elements.next()) {
        (Some(img), None) if img.is("img") => Some(img),
        _ => None,
    }
}

fn media_of(el: &Element) -> Media {
    let src = el.attr("src").unwrap_or_default().to_string();
    if el.is("iframe") {
        return Media {
            web_part_type: WebPartType::WikiVideo,
            properties: vec![
                (properties::IFRAME_EMBED, el.outer_html()),
                (properties::SOURCE, src),
            ],
        };
    }
    let mut props = vec![(properties::IMAGE_URL, src)];
    if let Some(alt) = el.attr("alt").filter(|a| !a.is_empty()) {
        props.push((properties::ALTERNATIVE_TEXT, alt.to_string()));
    }
    Media {
        web_part_type: WebPartType::WikiImage,
        properties: props,
    }
}

/// Replaces liftable media by the split marker and collects it in document
/// order. Media under tables or lists is left in place and collected apart.
fn mark_media(
    nodes: Vec<Node>,
    unsplittable: bool,
    lifted: &mut Vec<Media>,
    trapped: &mut Vec<Media>,
) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(el) => mark_element(el, unsplittable, lifted, trapped),
            other => other,
        })
        .collect()
}

fn mark_element(
    mut el: Element,
    unsplittable: bool,
    lifted: &mut Vec<Media>,
    trapped: &mut Vec<Media>,
) -> Node {
    if let Some(img) = anchored_image(&el) {
        let mut media = media_of(img);
        if let Some(href) = el.attr("href") {
            media.properties.push((properties::ANCHOR, href.to_string()));
        }
        let text = el.text_content();
        let caption = match text.trim() {
            "" => el.attr("title").unwrap_or_default().to_string(),
            t => t.to_string(),
        };
        if !caption.is_empty() {
            media.properties.push((properties::CAPTION, caption));
        }
        return place(media, Node::Element(el), unsplittable, lifted, trapped);
    }
    if is_media(&el) {
        let media = media_of(&el);
        return place(media, Node::Element(el), unsplittable, lifted, trapped);
    }
    let inside = unsplittable || UNSPLITTABLE.contains(&el.name.as_str());
    el.children = mark_media(el.children, inside, lifted, trapped);
    Node::Element(el)
}

fn place(
    media: Media,
    original: Node,
    unsplittable: bool,
    lifted: &mut Vec<Media>,
    trapped: &mut Vec<Media>,
) -> Node {
    if unsplittable {
        trapped.push(media);
        original
    } else {
        lifted.push(media);
        Node::Element(Element::new("span").with_attr("class", "split"))
    }
}

/// Re-parses a fragment and strips empty blocks; `None` when nothing is left.
fn clean_fragment(fragment: &str) -> Option<String> {
    let nodes = strip_empty_blocks(markup::parse_fragment(fragment));
    if nodes.iter().all(|n| n.is_blank_text() || matches!(n, Node::Comment(_))) {
        return None;
    }
    Some(markup::serialize(&nodes))
}

fn strip_empty_blocks(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .filter_map(|node| match node {
            Node::Element(mut el) => {
                el.children = strip_empty_blocks(el.children);
                let empty = EMPTY_BLOCKS.contains(&el.name.as_str())
                    && el.children.iter().all(Node::is_blank_text);
                (!empty).then_some(Node::Element(el))
            }
            other => Some(other),
        })
        .collect()
}

/// Next free placement after everything already on the page.
struct TailCounter {
    row: u32,
    column: u32,
    order: u32,
}

impl TailCounter {
    fn seeded_from(expansions: &[Expansion], bases: &[u32], headroom: u32) -> Self {
        let row = expansions.iter().map(|e| e.row).max().unwrap_or(1);
        let column = expansions
            .iter()
            .filter(|e| e.row == row)
            .map(|e| e.column)
            .max()
            .unwrap_or(1);
        let order = expansions
            .iter()
            .zip(bases)
            .filter(|(e, _)| e.row == row && e.column == column)
            .map(|(_, base)| base.saturating_add(headroom))
            .max()
            .unwrap_or(0);
        Self { row, column, order }
    }

    fn next(&mut self) -> (u32, u32, u32) {
        let placement = (self.row, self.column, self.order);
        self.order = self.order.saturating_add(1);
        placement
    }
}
