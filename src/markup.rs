//! Owned markup tree used by the normalizer and the wiki splitter.
//!
//! Fragments are tokenized with `scraper` and copied into plain [`Node`]
//! values, so every transformation stage can consume a tree and build a new
//! one without holding on to the parser's arena. Attributes are kept sorted
//! by name, which makes serialization deterministic.

use scraper::{ElementRef, Html};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    /// True for text nodes holding only whitespace (including non-breaking and zero-width spaces).
    pub fn is_blank_text(&self) -> bool {
        match self {
            Node::Text(text) => is_blank(text),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.binary_search_by(|(key, _)| key.as_str().cmp(name)) {
            Ok(index) => self.attrs[index].1 = value,
            Err(index) => self.attrs.insert(index, (name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self
            .attrs
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(index).1)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c.eq_ignore_ascii_case(class))
    }

    pub fn style(&self) -> Style {
        Style::parse(self.attr("style").unwrap_or(""))
    }

    /// Writes the style back, dropping the attribute when no declaration is left.
    pub fn set_style(&mut self, style: &Style) {
        if style.is_empty() {
            self.remove_attr("style");
        } else {
            self.set_attr("style", style.to_string());
        }
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    pub fn text_content(&self) -> String {
        text_content(&self.children)
    }

    pub fn inner_html(&self) -> String {
        serialize(&self.children)
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }

    /// True when any descendant element satisfies `predicate`.
    pub fn contains(&self, predicate: &impl Fn(&Element) -> bool) -> bool {
        contains(&self.children, predicate)
    }
}

/// Parsed inline CSS declarations, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    declarations: Vec<(String, String)>,
}

impl Style {
    pub fn parse(css: &str) -> Self {
        let declarations = css
            .split(';')
            .filter_map(|decl| {
                let (prop, value) = decl.split_once(':')?;
                let prop = prop.trim().to_ascii_lowercase();
                let value = value.trim();
                if prop.is_empty() || value.is_empty() {
                    None
                } else {
                    Some((prop, value.to_string()))
                }
            })
            .collect();
        Self { declarations }
    }

    pub fn get(&self, prop: &str) -> Option<&str> {
        self.declarations
            .iter()
            .rev()
            .find(|(key, _)| key == prop)
            .map(|(_, value)| value.as_str())
    }

    pub fn set(&mut self, prop: &str, value: impl Into<String>) {
        let value = value.into();
        match self.declarations.iter_mut().find(|(key, _)| key == prop) {
            Some(decl) => decl.1 = value,
            None => self.declarations.push((prop.to_string(), value)),
        }
    }

    pub fn remove(&mut self, prop: &str) {
        self.declarations.retain(|(key, _)| key != prop);
    }

    pub fn retain(&mut self, keep: &[&str]) {
        self.declarations.retain(|(key, _)| keep.contains(&key.as_str()));
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, (prop, value)) in self.declarations.iter().enumerate() {
            if index > 0 {
                f.write_str(";")?;
            }
            write!(f, "{prop}:{value}")?;
        }
        Ok(())
    }
}

/// Parses an HTML fragment in body context.
pub fn parse_fragment(html: &str) -> Vec<Node> {
    let document = Html::parse_fragment(html);
    convert_children(document.root_element())
}

fn convert_children(parent: ElementRef<'_>) -> Vec<Node> {
    parent
        .children()
        .filter_map(|child| match child.value() {
            scraper::Node::Text(text) => Some(Node::Text(String::from(&**text))),
            scraper::Node::Comment(comment) => Some(Node::Comment(String::from(&**comment))),
            scraper::Node::Element(_) => ElementRef::wrap(child).map(convert_element),
            _ => None,
        })
        .collect()
}

fn convert_element(element: ElementRef<'_>) -> Node {
    let value = element.value();
    let mut attrs: Vec<(String, String)> = value
        .attrs()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    Node::Element(Element {
        name: value.name().to_ascii_lowercase(),
        attrs,
        children: convert_children(element),
    })
}

pub fn serialize(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out, false);
    }
    out
}

fn write_node(node: &Node, out: &mut String, raw: bool) {
    match node {
        Node::Text(text) if raw => out.push_str(text),
        Node::Text(text) => escape_text(text, out),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::Element(el) => write_element(el, out),
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
    if el.is_void() {
        return;
    }
    let raw = RAW_TEXT_ELEMENTS.contains(&el.name.as_str());
    for child in &el.children {
        write_node(child, out, raw);
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

pub fn text_content(nodes: &[Node]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
            Node::Comment(_) => {}
        }
    }
}

/// True when any element in the forest (at any depth) satisfies `predicate`.
pub fn contains(nodes: &[Node], predicate: &impl Fn(&Element) -> bool) -> bool {
    nodes.iter().any(|node| match node {
        Node::Element(el) => predicate(el) || contains(&el.children, predicate),
        _ => false,
    })
}

pub fn is_blank(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || c == '\u{200B}' || c == '\u{a0}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_round_trip_simple_fragment() {
        let nodes = parse_fragment(r#"<p style="text-align:center">a &amp; b<br></p>"#);
        assert_eq!(
            serialize(&nodes),
            r#"<p style="text-align:center">a &amp; b<br></p>"#
        );
    }

    #[test]
    fn attributes_are_sorted_by_name() {
        let nodes = parse_fragment(r#"<img src="a.png" alt="A">"#);
        assert_eq!(serialize(&nodes), r#"<img alt="A" src="a.png">"#);
    }

    #[test]
    fn style_parses_and_prints_declarations() {
        let mut style = Style::parse(" Margin-Left : 40px; ; color:red;");
        assert_eq!(style.get("margin-left"), Some("40px"));
        style.retain(&["margin-left"]);
        assert_eq!(style.to_string(), "margin-left:40px");
    }

    #[test]
    fn set_style_drops_empty_attribute() {
        let mut el = Element::new("span").with_attr("style", "color:red");
        el.set_style(&Style::default());
        assert!(el.attr("style").is_none());
    }
}
