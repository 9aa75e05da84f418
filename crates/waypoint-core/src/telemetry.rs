//! Telemetry record sent with every rule check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maximum characters of element text carried in a record.
pub const MAX_TEXT_CHARS: usize = 400;
/// Maximum characters of outer HTML carried in a record.
pub const MAX_HTML_CHARS: usize = 4000;
/// Maximum number of nearby text snippets.
pub const MAX_NEARBY_TEXT: usize = 5;
/// Maximum number of ancestor descriptors.
pub const MAX_ANCESTORS: usize = 6;

/// Structured snapshot of a DOM interaction.
///
/// Every field is optional on the wire: a failed sub-step leaves its field
/// empty instead of dropping the record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    /// Trimmed text content (or form value), capped at [`MAX_TEXT_CHARS`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_text: Option<String>,
    /// Outer HTML, capped at [`MAX_HTML_CHARS`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_html: Option<String>,
    /// Flattened DOM attributes plus derived keys (`path`, session counters,
    /// numeric widget values).
    #[serde(default)]
    pub attributes: BTreeMap<String, Option<String>>,
    /// CSS path from the nearest id-bearing ancestor (or the root).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_path: Option<String>,
    /// XPath, when the document supports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    /// Up to [`MAX_NEARBY_TEXT`] sibling texts.
    #[serde(default)]
    pub nearby_text: Vec<String>,
    /// Up to [`MAX_ANCESTORS`] ancestor descriptors, nearest first.
    #[serde(default)]
    pub ancestors: Vec<AncestorInfo>,
}

impl TelemetryRecord {
    /// Look up a derived or DOM attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Option::as_deref)
    }
}

/// `{tag, id, class}` triple describing one ancestor element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorInfo {
    /// Lower-case tag name.
    pub tag: String,
    /// `id` attribute, if any.
    pub id: Option<String>,
    /// `class` attribute, if any.
    pub class: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_serializes_minimal() {
        let json = serde_json::to_value(TelemetryRecord::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"attributes": {}, "nearbyText": [], "ancestors": []})
        );
    }

    #[test]
    fn attribute_lookup_skips_nulls() {
        let mut record = TelemetryRecord::default();
        let _ = record.attributes.insert("id".into(), Some("buy".into()));
        let _ = record.attributes.insert("disabled".into(), None);
        assert_eq!(record.attribute("id"), Some("buy"));
        assert_eq!(record.attribute("disabled"), None);
        assert_eq!(record.attribute("missing"), None);
    }
}
