//! Telemetry synthesis.

use waypoint_core::telemetry::{
    AncestorInfo, MAX_ANCESTORS, MAX_HTML_CHARS, MAX_NEARBY_TEXT, MAX_TEXT_CHARS, TelemetryRecord,
};
use waypoint_core::text::{normalize_path, squash_whitespace, truncate_chars};
use waypoint_dom::{Document, NodeId};

use crate::locator::{css_path, xpath};
use crate::numeric::numeric_attribute;
use crate::session::SessionSnapshot;

/// Build the telemetry record for an interaction with `target`.
///
/// With no target (page load, route change, timers) only the derived
/// attributes are filled. A stale target degrades the same way: every step
/// yields `None` or empty instead of failing. `session` is merged into the
/// attributes when present.
pub fn synthesize(
    doc: &dyn Document,
    target: Option<NodeId>,
    session: Option<&SessionSnapshot>,
) -> TelemetryRecord {
    let mut record = TelemetryRecord::default();

    if let Some(node) = target.filter(|&n| doc.tag_name(n).is_some()) {
        record.element_text = element_text(doc, node);
        record.element_html = doc
            .outer_html(node)
            .map(|html| truncate_chars(&html, MAX_HTML_CHARS).to_owned());

        for (name, value) in doc.attributes(node) {
            let _ = record.attributes.insert(name, Some(value));
        }
        if let Some((key, number)) = numeric_attribute(doc, node) {
            let _ = record.attributes.entry(key).or_insert(Some(number));
        }

        record.css_path = css_path(doc, node);
        if doc.supports_xpath() {
            record.xpath = xpath(doc, node);
        }
        record.nearby_text = doc
            .sibling_texts(node, MAX_NEARBY_TEXT)
            .into_iter()
            .map(|t| truncate_chars(&t, MAX_TEXT_CHARS).to_owned())
            .collect();
        record.ancestors = doc
            .ancestors(node, MAX_ANCESTORS)
            .into_iter()
            .filter_map(|a| {
                Some(AncestorInfo {
                    tag: doc.tag_name(a)?,
                    id: doc.id(a),
                    class: doc.class(a),
                })
            })
            .collect();
    }

    let _ = record
        .attributes
        .insert("path".to_owned(), Some(normalize_path(&doc.location())));
    if let Some(session) = session {
        session.merge_into(&mut record.attributes);
    }
    record
}

fn element_text(doc: &dyn Document, node: NodeId) -> Option<String> {
    let text = doc
        .text_content(node)
        .map(|t| squash_whitespace(&t))
        .filter(|t| !t.is_empty())
        .or_else(|| {
            doc.form_value(node)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        })?;
    Some(truncate_chars(&text, MAX_TEXT_CHARS).to_owned())
}
