//! Numeric widget heuristic.
//!
//! Cart badges, quantity steppers and counters rarely expose their value as
//! an attribute. This scans the target and a few ancestors for the first
//! integer in their text and files it under a key derived from the element,
//! so rules can test e.g. `telemetry.attributes.cartCount`.

use tracing::trace;
use waypoint_core::text::{camel_case, squash_whitespace};
use waypoint_dom::{Document, NodeId};

/// Ancestors examined in addition to the target.
pub const MAX_NUMERIC_ANCESTORS: usize = 4;

const PREFERRED_DATA_HINTS: &[&str] = &[
    "name", "counter", "count", "qty", "quantity", "total", "badge", "value",
];

/// First run of ASCII digits in `text`, if any.
pub fn first_integer(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..len])
}

/// Key under which an element's number is reported.
///
/// Preference: camel-cased id, a `data-*` attribute whose name hints at a
/// count, any `data-*` attribute, then the first class.
pub fn numeric_key(doc: &dyn Document, node: NodeId) -> Option<String> {
    if let Some(id) = doc.id(node) {
        return non_empty(camel_case(&id));
    }

    let data_names: Vec<String> = doc
        .attributes(node)
        .into_iter()
        .filter_map(|(name, _)| {
            name.to_ascii_lowercase()
                .strip_prefix("data-")
                .map(str::to_owned)
        })
        .filter(|name| !name.is_empty())
        .collect();

    let preferred = data_names
        .iter()
        .find(|name| PREFERRED_DATA_HINTS.iter().any(|hint| name.contains(hint)));
    if let Some(name) = preferred.or_else(|| data_names.first()) {
        return non_empty(camel_case(name));
    }

    doc.class(node)
        .and_then(|class| class.split_whitespace().next().map(camel_case))
        .and_then(non_empty)
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Number and key of the nearest element, among the target and up to
/// [`MAX_NUMERIC_ANCESTORS`] ancestors, whose text holds an integer and
/// that yields a key. The scan stops at the first such element.
pub fn numeric_attribute(doc: &dyn Document, target: NodeId) -> Option<(String, String)> {
    std::iter::once(target)
        .chain(doc.ancestors(target, MAX_NUMERIC_ANCESTORS))
        .find_map(|node| {
            let text = squash_whitespace(&doc.text_content(node)?);
            let number = first_integer(&text)?.to_owned();
            let key = numeric_key(doc, node)?;
            trace!(key = %key, number = %number, "numeric widget value");
            Some((key, number))
        })
}
