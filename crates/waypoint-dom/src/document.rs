//! The [`Document`] trait and its handle type.

use std::fmt;

use waypoint_core::text::squash_whitespace;

use crate::errors::Result;

/// Opaque handle to an element in a [`Document`].
///
/// Handles are only meaningful for the document that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Synthetic events the assistant can dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DomEventKind {
    /// `click`
    Click,
    /// `input`
    Input,
    /// `change`
    Change,
}

/// Read/write access to the host page.
///
/// Lookups return `None` rather than failing: a node that vanished between
/// capture and synthesis simply yields less telemetry. Only operations the
/// assistant initiates (selectors, writes, navigation) return errors.
pub trait Document: Send + Sync {
    /// Full URL of the current page.
    fn location(&self) -> String;

    /// The `<body>` element.
    fn body(&self) -> Option<NodeId>;

    /// Element with the given `id` attribute.
    fn element_by_id(&self, id: &str) -> Option<NodeId>;

    /// First element matching a CSS selector.
    fn query_selector(&self, selector: &str) -> Result<Option<NodeId>>;

    /// Lower-case tag name. `None` for a stale handle.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// All attributes in document order.
    fn attributes(&self, node: NodeId) -> Vec<(String, String)>;

    /// Concatenated descendant text, untrimmed.
    fn text_content(&self, node: NodeId) -> Option<String>;

    /// Current value of an `input`, `textarea` or `select`.
    fn form_value(&self, node: NodeId) -> Option<String>;

    /// Serialized element including its own tag.
    fn outer_html(&self, node: NodeId) -> Option<String>;

    /// Parent element; `None` at the root.
    fn parent_element(&self, node: NodeId) -> Option<NodeId>;

    /// Element children in document order.
    fn child_elements(&self, node: NodeId) -> Vec<NodeId>;

    /// Whether XPath expressions are available for this document.
    fn supports_xpath(&self) -> bool {
        true
    }

    /// Set the value of a form control.
    fn set_form_value(&self, node: NodeId, value: &str) -> Result<()>;

    /// Dispatch a synthetic event at `node`.
    fn dispatch(&self, node: NodeId, event: DomEventKind) -> Result<()>;

    /// Navigate to `url`; `target` follows anchor semantics (`_blank`, ...).
    fn navigate(&self, url: &str, target: Option<&str>) -> Result<()>;

    // ── Provided helpers ────────────────────────────────────────────────────

    /// Value of one attribute.
    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.attributes(node)
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Non-empty `id` attribute.
    fn id(&self, node: NodeId) -> Option<String> {
        self.attribute(node, "id").filter(|v| !v.is_empty())
    }

    /// Non-empty `class` attribute.
    fn class(&self, node: NodeId) -> Option<String> {
        self.attribute(node, "class").filter(|v| !v.is_empty())
    }

    /// Up to `limit` ancestors, nearest first.
    fn ancestors(&self, node: NodeId, limit: usize) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.parent_element(node);
        while let Some(parent) = cur {
            if out.len() >= limit {
                break;
            }
            out.push(parent);
            cur = self.parent_element(parent);
        }
        out
    }

    /// Whitespace-collapsed, non-empty texts of `node`'s element siblings.
    fn sibling_texts(&self, node: NodeId, limit: usize) -> Vec<String> {
        let Some(parent) = self.parent_element(node) else {
            return Vec::new();
        };
        self.child_elements(parent)
            .into_iter()
            .filter(|&sibling| sibling != node)
            .filter_map(|sibling| self.text_content(sibling))
            .map(|text| squash_whitespace(&text))
            .filter(|text| !text.is_empty())
            .take(limit)
            .collect()
    }
}
