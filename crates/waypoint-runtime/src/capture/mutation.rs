//! Scope of text/value mutation observation.

use std::collections::BTreeSet;

use waypoint_dom::{Document, NodeId};
use waypoint_rules::{CssPattern, RuleFocusIndex};
use waypoint_telemetry::css_path;

use waypoint_core::EventKind;

/// Ancestors checked above a mutated node.
pub const MUTATION_ANCESTOR_DEPTH: usize = 5;

/// Elements whose mutations are bridged to `input_change`.
///
/// Only built from an `input_change` bundle with id or CSS filters, so the
/// assistant never watches the whole page.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationScope {
    ids: BTreeSet<String>,
    css_literals: BTreeSet<String>,
    css_patterns: Vec<CssPattern>,
}

impl MutationScope {
    /// Scope for the index's `input_change` filters, if it has any.
    pub fn from_index(index: &RuleFocusIndex) -> Option<Self> {
        let bundle = index.bundle(EventKind::InputChange)?;
        if !bundle.restricts_targets() {
            return None;
        }
        Some(Self {
            ids: bundle.ids().clone(),
            css_literals: bundle.css_literals().clone(),
            css_patterns: bundle.css_patterns().to_vec(),
        })
    }

    /// Element ids in scope.
    pub fn ids(&self) -> &BTreeSet<String> {
        &self.ids
    }

    /// Whether a mutation at `node` is in scope: the node or one of its
    /// nearest ancestors matches an id or CSS filter.
    pub fn covers(&self, doc: &dyn Document, node: NodeId) -> bool {
        std::iter::once(node)
            .chain(doc.ancestors(node, MUTATION_ANCESTOR_DEPTH))
            .any(|n| self.matches(doc, n))
    }

    fn matches(&self, doc: &dyn Document, node: NodeId) -> bool {
        if doc.id(node).is_some_and(|id| self.ids.contains(&id)) {
            return true;
        }
        if self.css_literals.is_empty() && self.css_patterns.is_empty() {
            return false;
        }
        css_path(doc, node).is_some_and(|css| {
            self.css_literals.contains(&css) || self.css_patterns.iter().any(|p| p.is_match(&css))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waypoint_core::rules::{RawCondition, RuleListItem, RuleTrigger};
    use waypoint_dom::MemoryDocument;

    fn index_with(kind: &str, conditions: Vec<RawCondition>) -> RuleFocusIndex {
        RuleFocusIndex::build(&[RuleListItem {
            id: "r".into(),
            enabled: true,
            tracking: true,
            triggers: vec![RuleTrigger {
                event_kind: kind.into(),
                conditions,
            }],
        }])
    }

    #[test]
    fn unscoped_observation_is_rejected() {
        let index = index_with("input_change", vec![]);
        assert!(MutationScope::from_index(&index).is_none());
        assert!(MutationScope::from_index(&RuleFocusIndex::permissive()).is_none());

        let click_only = index_with(
            "dom_click",
            vec![RawCondition::new("telemetry.attributes.id", "equals", json!("qty"))],
        );
        assert!(MutationScope::from_index(&click_only).is_none());
    }

    #[test]
    fn covers_node_and_ancestors() {
        let index = index_with(
            "input_change",
            vec![RawCondition::new("telemetry.attributes.id", "equals", json!("cart-count"))],
        );
        let scope = MutationScope::from_index(&index).unwrap();
        let doc = MemoryDocument::parse(
            r#"<html><body><div id="cart-count"><span><b id="n">3</b></span></div><p id="other">x</p></body></html>"#,
            "https://shop.test/",
        );
        assert!(scope.covers(&doc, doc.element_by_id("cart-count").unwrap()));
        assert!(scope.covers(&doc, doc.element_by_id("n").unwrap()));
        assert!(!scope.covers(&doc, doc.element_by_id("other").unwrap()));
    }
}
