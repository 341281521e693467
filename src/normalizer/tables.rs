//! Table normalization: explicit cell grid, fixed column widths, flattened nesting.

use tracing::warn;

use crate::error::{Result, TransformationError};
use crate::markup::{Element, Node, Style};

/// Total width, in pixels, distributed over the columns of a normalized table.
pub const DEFAULT_TABLE_WIDTH: u32 = 800;

/// Spans above this value are treated as malformed markup.
const MAX_SPAN: usize = 1000;

/// Splits `total` evenly over `columns`; the last column takes the remainder.
pub fn column_widths(total: u32, columns: usize) -> Vec<u32> {
    if columns == 0 {
        return Vec::new();
    }
    let n = columns as u32;
    let base = total / n;
    let mut widths = vec![base; columns];
    if let Some(last) = widths.last_mut() {
        *last = total - base * (n - 1);
    }
    widths
}

/// Normalizes every outermost table in the forest.
///
/// Nested tables are lifted out and placed, normalized, right after the
/// outermost table that contained them. A table that cannot be normalized is
/// kept unchanged and logged.
pub fn normalize_tables(nodes: Vec<Node>, width: u32) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Element(table) if table.is("table") => match normalize_outermost(&table, width) {
                Ok(normalized) => out.extend(normalized.into_iter().map(Node::Element)),
                Err(e) => {
                    warn!(error = %e, "[NORMALIZE] Skipping table that could not be normalized");
                    out.push(Node::Element(table));
                }
            },
            Node::Element(mut el) => {
                el.children = normalize_tables(el.children, width);
                out.push(Node::Element(el));
            }
            other => out.push(other),
        }
    }
    out
}

fn normalize_outermost(table: &Element, width: u32) -> Result<Vec<Element>> {
    let mut nested = Vec::new();
    collect_nested_tables(&table.children, &mut nested);

    let mut out = Vec::with_capacity(nested.len() + 1);
    out.extend(normalize_table(table, width)?);
    for inner in nested {
        match normalize_table(inner, width) {
            Ok(normalized) => out.extend(normalized),
            Err(e) => warn!(error = %e, "[NORMALIZE] Dropping nested table that could not be normalized"),
        }
    }
    Ok(out)
}

/// Every table below `nodes`, in document order, outer before inner.
fn collect_nested_tables<'a>(nodes: &'a [Node], out: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.is("table") {
                out.push(el);
            }
            collect_nested_tables(&el.children, out);
        }
    }
}

fn strip_tables(nodes: &[Node]) -> Vec<Node> {
    nodes
        .iter()
        .filter_map(|node| match node {
            Node::Element(el) if el.is("table") => None,
            Node::Element(el) => {
                let mut el = el.clone();
                el.children = strip_tables(&el.children);
                Some(Node::Element(el))
            }
            other => Some(other.clone()),
        })
        .collect()
}

/// Rows of `table`, looking through row groups but not into nested tables.
fn table_rows(table: &Element) -> Vec<&Element> {
    let mut rows = Vec::new();
    for child in table.children.iter().filter_map(Node::as_element) {
        if child.is("tr") {
            rows.push(child);
        } else if child.is("thead") || child.is("tbody") || child.is("tfoot") {
            rows.extend(
                child
                    .children
                    .iter()
                    .filter_map(Node::as_element)
                    .filter(|el| el.is("tr")),
            );
        }
    }
    rows
}

#[derive(Debug, Clone)]
enum GridCell {
    Content {
        header: bool,
        align: Option<String>,
        children: Vec<Node>,
    },
    Spanned {
        header: bool,
    },
}

impl GridCell {
    fn is_header(&self) -> bool {
        match self {
            GridCell::Content { header, .. } | GridCell::Spanned { header } => *header,
        }
    }
}

fn parse_span(cell: &Element, name: &str) -> Result<usize> {
    let Some(raw) = cell.attr(name) else {
        return Ok(1);
    };
    let span: usize = raw
        .trim()
        .parse()
        .map_err(|_| TransformationError::Markup(format!("invalid {name} '{raw}'")))?;
    match span {
        0 => Ok(1),
        s if s > MAX_SPAN => Err(TransformationError::Markup(format!(
            "{name} {s} exceeds {MAX_SPAN}"
        ))),
        s => Ok(s),
    }
}

/// Normalizes one table with its nested tables stripped.
///
/// Returns `Ok(None)` when the table has no rows or no columns.
fn normalize_table(table: &Element, width: u32) -> Result<Option<Element>> {
    let rows = table_rows(table);
    let mut grid: Vec<Vec<Option<GridCell>>> = vec![Vec::new(); rows.len()];

    for (r, row) in rows.iter().enumerate() {
        let mut c = 0;
        for cell in row.children.iter().filter_map(Node::as_element) {
            let header = cell.is("th");
            if !header && !cell.is("td") {
                continue;
            }
            while grid[r].get(c).is_some_and(Option::is_some) {
                c += 1;
            }
            let colspan = parse_span(cell, "colspan")?;
            let rowspan = parse_span(cell, "rowspan")?;
            let last_row = (r + rowspan).min(rows.len());
            for (dr, grid_row) in grid[r..last_row].iter_mut().enumerate() {
                if grid_row.len() < c + colspan {
                    grid_row.resize(c + colspan, None);
                }
                for (dc, slot) in grid_row[c..c + colspan].iter_mut().enumerate() {
                    *slot = Some(if dr == 0 && dc == 0 {
                        GridCell::Content {
                            header,
                            align: cell.style().get("text-align").map(str::to_string),
                            children: strip_tables(&cell.children),
                        }
                    } else {
                        GridCell::Spanned { header }
                    });
                }
            }
            c += colspan;
        }
    }

    let columns = grid.iter().map(Vec::len).max().unwrap_or(0);
    if grid.is_empty() || columns == 0 {
        return Ok(None);
    }
    let widths = column_widths(width, columns);

    let header_row = grid[0]
        .iter()
        .all(|cell| cell.as_ref().is_some_and(GridCell::is_header))
        && grid[0].len() == columns;

    let mut body_rows = Vec::new();
    let mut head_rows = Vec::new();
    for (r, row) in grid.into_iter().enumerate() {
        let is_head = header_row && r == 0;
        let mut tr = Element::new("tr");
        for c in 0..columns {
            let cell = row.get(c).cloned().flatten();
            let mut el = Element::new(if is_head { "th" } else { "td" });
            let mut style = Style::default();
            style.set("width", format!("{}px", widths[c]));
            if let Some(GridCell::Content {
                align, children, ..
            }) = cell
            {
                if let Some(align) = align {
                    style.set("text-align", align);
                }
                el.children = children;
            }
            el.set_style(&style);
            tr.children.push(Node::Element(el));
        }
        if is_head {
            head_rows.push(Node::Element(tr));
        } else {
            body_rows.push(Node::Element(tr));
        }
    }

    let mut normalized = Element::new("table");
    if !head_rows.is_empty() {
        normalized
            .children
            .push(Node::Element(Element::new("thead").with_children(head_rows)));
    }
    normalized
        .children
        .push(Node::Element(Element::new("tbody").with_children(body_rows)));
    Ok(Some(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse_fragment, serialize};

    #[test]
    fn widths_sum_to_total_with_remainder_last() {
        let widths = column_widths(800, 3);
        assert_eq!(widths, vec![266, 266, 268]);
        assert_eq!(widths.iter().sum::<u32>(), 800);
    }

    #[test]
    fn spans_expand_into_grid() {
        let nodes = parse_fragment(
            r#"<table><tr><td colspan="2">a</td></tr><tr><td>b</td><td>c</td></tr></table>"#,
        );
        let html = serialize(&normalize_tables(nodes, 100));
        assert_eq!(
            html,
            concat!(
                r#"<table><tbody><tr><td style="width:50px">a</td><td style="width:50px"></td></tr>"#,
                r#"<tr><td style="width:50px">b</td><td style="width:50px">c</td></tr></tbody></table>"#
            )
        );
    }

    #[test]
    fn empty_table_is_dropped() {
        let nodes = parse_fragment("<p>x</p><table></table>");
        assert_eq!(serialize(&normalize_tables(nodes, 800)), "<p>x</p>");
    }
}
