//! Element locators: CSS path and XPath.

use std::fmt::Write as _;

use waypoint_dom::{Document, NodeId};

/// 1-based position of `node` among its parent's children with the same tag.
fn position_of_type(doc: &dyn Document, node: NodeId, tag: &str) -> usize {
    let Some(parent) = doc.parent_element(node) else {
        return 1;
    };
    doc.child_elements(parent)
        .into_iter()
        .filter(|&sibling| doc.tag_name(sibling).as_deref() == Some(tag))
        .position(|sibling| sibling == node)
        .map_or(1, |i| i + 1)
}

/// Escape an identifier for use after `#` in a selector.
fn escape_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, c) in ident.chars().enumerate() {
        if i == 0 && c.is_ascii_digit() {
            let _ = write!(out, "\\{:x} ", u32::from(c));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// CSS path from the nearest id-bearing ancestor, or from below `<html>`.
///
/// Each step is `#id` (which ends the walk) or `tag:nth-of-type(n)`.
/// Steps are joined with `" > "`.
pub fn css_path(doc: &dyn Document, node: NodeId) -> Option<String> {
    let target_tag = doc.tag_name(node)?;
    let mut steps = Vec::new();
    let mut cur = Some(node);

    while let Some(n) = cur {
        let Some(tag) = doc.tag_name(n) else { break };
        if tag == "html" {
            break;
        }
        if let Some(id) = doc.id(n) {
            steps.push(format!("#{}", escape_ident(&id)));
            break;
        }
        let nth = position_of_type(doc, n, &tag);
        steps.push(format!("{tag}:nth-of-type({nth})"));
        cur = doc.parent_element(n);
    }

    if steps.is_empty() {
        return Some(target_tag);
    }
    steps.reverse();
    Some(steps.join(" > "))
}

/// XPath to `node`: `//*[@id="..."]` anchored at the nearest id-bearing
/// ancestor, else absolute from `/html`.
pub fn xpath(doc: &dyn Document, node: NodeId) -> Option<String> {
    let _ = doc.tag_name(node)?;
    let mut steps = Vec::new();
    let mut cur = Some(node);
    let mut anchor = None;

    while let Some(n) = cur {
        let Some(tag) = doc.tag_name(n) else { break };
        if let Some(id) = doc.id(n).filter(|id| !id.contains('"')) {
            anchor = Some(format!("//*[@id=\"{id}\"]"));
            break;
        }
        if doc.parent_element(n).is_none() {
            steps.push(tag);
        } else {
            let nth = position_of_type(doc, n, &tag);
            steps.push(format!("{tag}[{nth}]"));
        }
        cur = doc.parent_element(n);
    }

    steps.reverse();
    let tail = steps.join("/");
    Some(match anchor {
        Some(anchor) if tail.is_empty() => anchor,
        Some(anchor) => format!("{anchor}/{tail}"),
        None => format!("/{tail}"),
    })
}
