//! Content normalizer: rewrites classic wiki rich text into markup the modern
//! text part accepts.
//!
//! Stages run in a fixed order, each consuming a tree and returning a new one:
//! heading demotion, indentation blockquote flattening, inline style
//! rewriting, optional media placeholders, table normalization, style cleanup
//! and disallowed node replacement.

pub mod styles;
pub mod tables;

use tracing::warn;

use crate::markup::{self, Element, Node, Style};

pub use tables::{column_widths, DEFAULT_TABLE_WIDTH};

const INDENT_STEP_PX: u32 = 40;

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "ul", "ol", "li", "pre",
    "table", "thead", "tbody", "tfoot", "tr",
];

const INLINE_STYLED_ELEMENTS: &[&str] = &["span", "sup", "sub", "strong", "em", "p"];

const ALLOWED_ATTRIBUTES: &[&str] = &["alt", "class", "href", "rel", "src", "style", "target", "title"];

#[derive(Debug, Clone)]
pub struct ContentNormalizer {
    table_width: u32,
}

impl Default for ContentNormalizer {
    fn default() -> Self {
        Self {
            table_width: DEFAULT_TABLE_WIDTH,
        }
    }
}

impl ContentNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_width(mut self, width: u32) -> Self {
        self.table_width = width;
        self
    }

    /// Normalizes a wiki markup fragment. With `use_placeholder`, images and
    /// iframes are replaced by a text marker naming their source.
    pub fn transform(&self, markup: &str, use_placeholder: bool) -> String {
        let nodes = markup::parse_fragment(markup);
        let nodes = transform_headings(nodes);
        let nodes = flatten_blockquotes(nodes);
        let nodes = rewrite_inline_styles(nodes, Decoration::default());
        let nodes = if use_placeholder {
            insert_placeholders(nodes)
        } else {
            nodes
        };
        let nodes = tables::normalize_tables(nodes, self.table_width);
        let nodes = clean_up_styles(nodes);
        let nodes = replace_disallowed(nodes);
        markup::serialize(&nodes)
    }
}

/// True for empty text, a lone zero-width space, or an empty paragraph
/// optionally wrapped in a span.
pub fn is_empty_paragraph(text: &str) -> bool {
    if text.is_empty() || text == "\u{200B}" {
        return true;
    }
    let nodes = markup::parse_fragment(text);
    match single_element(&nodes) {
        Some(span) if span.is("span") => {
            single_element(&span.children).is_some_and(is_empty_p)
        }
        Some(el) => is_empty_p(el),
        None => false,
    }
}

fn single_element(nodes: &[Node]) -> Option<&Element> {
    let mut elements = nodes.iter().filter(|n| !n.is_blank_text());
    match (elements.next(), elements.next()) {
        (Some(Node::Element(el)), None) => Some(el),
        _ => None,
    }
}

fn is_empty_p(el: &Element) -> bool {
    el.is("p") && el.children.iter().all(Node::is_blank_text)
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn transform_headings(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(mut el) => {
                el.children = transform_headings(el.children);
                match heading_level(&el.name) {
                    Some(level) => Node::Element(demote_heading(el, level)),
                    None => Node::Element(el),
                }
            }
            other => other,
        })
        .collect()
}

fn demote_heading(heading: Element, level: u8) -> Element {
    let name = match level {
        1 => "h2",
        2 => "h3",
        3 => "h4",
        _ => "div",
    };
    let align = heading.style().get("text-align").map(str::to_string);
    let mut demoted = Element::new(name).with_children(heading.children);
    if let Some(align) = align {
        demoted.set_attr("style", format!("text-align:{align}"));
    }
    demoted
}

/// Strikethrough and underline in effect for a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Decoration {
    strike: bool,
    underline: bool,
}

impl Decoration {
    fn from_style(style: &Style) -> Self {
        let value = [style.get("text-decoration"), style.get("text-decoration-line")]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        Self {
            strike: value.contains("line-through"),
            underline: value.contains("underline"),
        }
    }

    fn of_element(name: &str) -> Self {
        Self {
            strike: matches!(name, "s" | "strike" | "del"),
            underline: name == "u",
        }
    }

    fn union(self, other: Self) -> Self {
        Self {
            strike: self.strike || other.strike,
            underline: self.underline || other.underline,
        }
    }

    /// The part of `self` not already applied by `context`.
    fn missing_from(self, context: Self) -> Self {
        Self {
            strike: self.strike && !context.strike,
            underline: self.underline && !context.underline,
        }
    }

    /// Wraps `children` in explicit elements; strikethrough wraps underline.
    fn wrap(self, children: Vec<Node>) -> Vec<Node> {
        let mut children = children;
        if self.underline {
            children = vec![Node::Element(Element::new("u").with_children(children))];
        }
        if self.strike {
            children = vec![Node::Element(Element::new("s").with_children(children))];
        }
        children
    }
}

fn is_block(el: &Element) -> bool {
    BLOCK_ELEMENTS.contains(&el.name.as_str())
}

/// Left margin of a blockquote used for indentation.
fn is_indent_blockquote(el: &Element) -> bool {
    if !el.is("blockquote") {
        return false;
    }
    let style = el.style();
    if let Some(left) = style.get("margin-left") {
        return left == "40px";
    }
    style.get("margin").is_some_and(|margin| {
        let parts: Vec<&str> = margin.split_whitespace().collect();
        let left = match parts.len() {
            1 => parts[0],
            2 | 3 => parts[1],
            4 => parts[3],
            _ => return false,
        };
        left == "40px"
    })
}

fn flatten_blockquotes(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .flat_map(|node| match node {
            Node::Element(el) if is_indent_blockquote(&el) => {
                flatten_indent(el, 1, Decoration::default())
            }
            Node::Element(mut el) => {
                el.children = flatten_blockquotes(el.children);
                vec![Node::Element(el)]
            }
            other => vec![other],
        })
        .collect()
}

fn flatten_indent(quote: Element, level: u32, inherited: Decoration) -> Vec<Node> {
    let decoration = inherited.union(Decoration::from_style(&quote.style()));
    let margin = format!("{}px", level * INDENT_STEP_PX);
    let mut out = Vec::new();
    let mut inline_run: Vec<Node> = Vec::new();

    let flush = |run: &mut Vec<Node>, out: &mut Vec<Node>| {
        if run.iter().all(|n| n.is_blank_text() || matches!(n, Node::Comment(_))) {
            run.clear();
            return;
        }
        let children = decoration.wrap(std::mem::take(run));
        out.push(Node::Element(
            Element::new("p")
                .with_attr("style", format!("margin-left:{margin}"))
                .with_children(children),
        ));
    };

    for child in quote.children {
        match child {
            Node::Element(inner) if is_indent_blockquote(&inner) => {
                flush(&mut inline_run, &mut out);
                out.extend(flatten_indent(inner, level + 1, decoration));
            }
            Node::Element(mut block) if is_block(&block) => {
                flush(&mut inline_run, &mut out);
                let mut style = block.style();
                style.set("margin-left", margin.clone());
                block.set_style(&style);
                block.children = decoration.wrap(flatten_blockquotes(block.children));
                out.push(Node::Element(block));
            }
            other => inline_run.push(other),
        }
    }
    flush(&mut inline_run, &mut out);
    out
}

fn rewrite_inline_styles(nodes: Vec<Node>, context: Decoration) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(el) => Node::Element(rewrite_inline_element(el, context)),
            other => other,
        })
        .collect()
}

fn rewrite_inline_element(mut el: Element, context: Decoration) -> Element {
    let context = context.union(Decoration::of_element(&el.name));
    if !INLINE_STYLED_ELEMENTS.contains(&el.name.as_str()) {
        el.children = rewrite_inline_styles(el.children, context);
        return el;
    }

    if let Some(classes) = el.attr("class").map(styles::rewrite_class_list) {
        if classes.is_empty() {
            el.remove_attr("class");
        } else {
            el.set_attr("class", classes);
        }
    }

    let mut style = el.style();
    let decoration = Decoration::from_style(&style);
    style.remove("text-decoration");
    style.remove("text-decoration-line");
    el.set_style(&style);

    let children = rewrite_inline_styles(el.children, context.union(decoration));
    el.children = decoration.missing_from(context).wrap(children);
    el
}

fn insert_placeholders(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(el) if el.is("img") || el.is("iframe") => {
                let kind = if el.is("img") { "Image" } else { "IFrame" };
                let source = el.attr("src").unwrap_or_default();
                if source.is_empty() {
                    warn!(element = %el.name, "[NORMALIZE] Media element without source");
                }
                Node::text(format!("***{kind} placeholder for source {source}***"))
            }
            Node::Element(mut el) => {
                el.children = insert_placeholders(el.children);
                Node::Element(el)
            }
            other => other,
        })
        .collect()
}

fn clean_up_styles(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(mut el) => {
                el.attrs
                    .retain(|(name, _)| ALLOWED_ATTRIBUTES.contains(&name.as_str()));
                let mut style = el.style();
                if is_block(&el) {
                    style.retain(&["margin-left", "text-align"]);
                } else {
                    style.retain(&["width", "text-align"]);
                }
                el.set_style(&style);
                if el.attr("class").is_some_and(|c| c.trim().is_empty()) {
                    el.remove_attr("class");
                }
                el.children = clean_up_styles(el.children);
                Node::Element(el)
            }
            other => other,
        })
        .collect()
}

fn replace_disallowed(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .flat_map(|node| match node {
            Node::Element(el) if el.is("hr") => vec![
                Node::Element(Element::new("br")),
                Node::Element(Element::new("br")),
            ],
            Node::Element(mut el) => {
                el.children = replace_disallowed(el.children);
                vec![Node::Element(el)]
            }
            other => vec![other],
        })
        .collect()
}
