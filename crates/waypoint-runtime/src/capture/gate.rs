//! Event gating against the focus index.

use serde_json::{Map, Value};
use tracing::debug;
use waypoint_core::EventKind;
use waypoint_dom::{Document, NodeId};
use waypoint_rules::{FocusFilterBundle, RuleFocusIndex};
use waypoint_telemetry::css_path;

/// Ancestors checked above a click/input target.
pub const TARGET_ANCESTOR_DEPTH: usize = 5;

/// Why an event was (or was not) let through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Schedule an evaluation.
    Pass,
    /// No allowed bundle for the kind.
    KindNotAllowed,
    /// Current path not in the bundle's paths.
    PathFiltered,
    /// Neither the target nor its ancestors match an id or CSS filter.
    TargetFiltered,
    /// No session condition holds.
    SessionFiltered,
}

/// Gate an event of `kind` at `target` on the current page.
///
/// Order: kind, path, target, session. Engine-synthesized kinds
/// (`page_load`, `route_change`, `time_spent`) skip target gating.
pub fn admit(
    index: &RuleFocusIndex,
    kind: EventKind,
    doc: &dyn Document,
    target: Option<NodeId>,
    session: &Map<String, Value>,
) -> GateDecision {
    let Some(bundle) = index.bundle(kind) else {
        return GateDecision::KindNotAllowed;
    };
    let decision = check_bundle(bundle, kind, doc, target, session);
    if decision != GateDecision::Pass {
        debug!(kind = %kind, ?decision, "event gated");
    }
    decision
}

fn check_bundle(
    bundle: &FocusFilterBundle,
    kind: EventKind,
    doc: &dyn Document,
    target: Option<NodeId>,
    session: &Map<String, Value>,
) -> GateDecision {
    if !bundle.path_allowed(&doc.location()) {
        return GateDecision::PathFiltered;
    }
    if kind.is_listener_driven() && bundle.restricts_targets() {
        let matched = target.is_some_and(|node| {
            std::iter::once(node)
                .chain(doc.ancestors(node, TARGET_ANCESTOR_DEPTH))
                .any(|n| {
                    let id = doc.id(n);
                    // CSS paths are only computed when a CSS filter exists.
                    let css = if bundle.css_literals().is_empty() && bundle.css_patterns().is_empty() {
                        None
                    } else {
                        css_path(doc, n)
                    };
                    bundle.element_matches(id.as_deref(), css.as_deref())
                })
        });
        if !matched {
            return GateDecision::TargetFiltered;
        }
    }
    if !bundle.session_allowed(session) {
        return GateDecision::SessionFiltered;
    }
    GateDecision::Pass
}
