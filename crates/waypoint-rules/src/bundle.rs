//! Per-event-kind focus filters.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use waypoint_core::text::normalize_path;

use crate::condition::{Condition, CssPattern, SessionCondition, TimeThreshold};

/// Everything the client knows about when an event of one kind is worth
/// evaluating.
///
/// Filters from different triggers are unioned into sets. A trigger that
/// does not constrain a dimension adds nothing to it; an empty set matches
/// everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FocusFilterBundle {
    paths: BTreeSet<String>,
    ids: BTreeSet<String>,
    css_literals: BTreeSet<String>,
    css_patterns: Vec<CssPattern>,
    time_thresholds: BTreeSet<TimeThreshold>,
    session_conditions: Vec<SessionCondition>,
}

impl FocusFilterBundle {
    /// Fold one trigger's compiled conditions into the bundle.
    pub fn absorb_trigger(&mut self, conditions: Vec<Condition>) {
        for condition in conditions {
            match condition {
                Condition::PathEquals(path) => {
                    let _ = self.paths.insert(path);
                }
                Condition::IdEquals(id) => {
                    let _ = self.ids.insert(id);
                }
                Condition::CssPathEquals(css) => {
                    let _ = self.css_literals.insert(css);
                }
                Condition::CssPathMatches(pattern) => {
                    if !self.css_patterns.contains(&pattern) {
                        self.css_patterns.push(pattern);
                    }
                }
                Condition::TimeOnPage(threshold) => {
                    let _ = self.time_thresholds.insert(threshold);
                }
                Condition::Session(cond) => {
                    if !self.session_conditions.contains(&cond) {
                        self.session_conditions.push(cond);
                    }
                }
            }
        }
    }

    // ── Gating ──────────────────────────────────────────────────────────────

    /// Whether the bundle narrows by path.
    pub fn restricts_paths(&self) -> bool {
        !self.paths.is_empty()
    }

    /// Whether the bundle narrows by target element.
    pub fn restricts_targets(&self) -> bool {
        !self.ids.is_empty() || !self.css_literals.is_empty() || !self.css_patterns.is_empty()
    }

    /// Whether the bundle narrows by session state.
    pub fn restricts_session(&self) -> bool {
        !self.session_conditions.is_empty()
    }

    /// Whether `path` (URL or path) passes the path filter.
    pub fn path_allowed(&self, path: &str) -> bool {
        !self.restricts_paths() || self.paths.contains(&normalize_path(path))
    }

    /// Whether a single element, described by its id and CSS path, matches
    /// any id or CSS filter. Callers walk the ancestor chain themselves.
    pub fn element_matches(&self, id: Option<&str>, css_path: Option<&str>) -> bool {
        if id.is_some_and(|id| self.ids.contains(id)) {
            return true;
        }
        css_path.is_some_and(|css| {
            self.css_literals.contains(css) || self.css_patterns.iter().any(|p| p.is_match(css))
        })
    }

    /// Any-of over session conditions; passes when unrestricted.
    pub fn session_allowed(&self, session: &Map<String, Value>) -> bool {
        !self.restricts_session() || self.session_conditions.iter().any(|c| c.matches(session))
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Normalized paths.
    pub fn paths(&self) -> &BTreeSet<String> {
        &self.paths
    }

    /// Element ids.
    pub fn ids(&self) -> &BTreeSet<String> {
        &self.ids
    }

    /// Exact CSS paths.
    pub fn css_literals(&self) -> &BTreeSet<String> {
        &self.css_literals
    }

    /// CSS path patterns.
    pub fn css_patterns(&self) -> &[CssPattern] {
        &self.css_patterns
    }

    /// Thresholds that schedule `time_spent` timers, ascending.
    pub fn armed_thresholds(&self) -> impl Iterator<Item = &TimeThreshold> {
        self.time_thresholds.iter().filter(|t| t.arms_timer())
    }

    /// Generic session conditions.
    pub fn session_conditions(&self) -> &[SessionCondition] {
        &self.session_conditions
    }

    /// Whether telemetry needs session counters for this kind.
    pub fn tracks_session(&self) -> bool {
        !self.time_thresholds.is_empty() || !self.session_conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;
    use serde_json::json;

    fn css(p: &str) -> Condition {
        Condition::CssPathMatches(CssPattern::new(p).unwrap())
    }

    #[test]
    fn empty_bundle_allows_everything() {
        let bundle = FocusFilterBundle::default();
        assert!(bundle.path_allowed("/anything"));
        assert!(!bundle.restricts_targets());
        assert!(bundle.session_allowed(&Map::new()));
        assert!(!bundle.tracks_session());
    }

    #[test]
    fn path_and_id_filters() {
        let mut bundle = FocusFilterBundle::default();
        bundle.absorb_trigger(vec![
            Condition::PathEquals("/product".into()),
            Condition::IdEquals("add-to-cart".into()),
        ]);
        assert!(bundle.path_allowed("https://shop.test/product/?x=1"));
        assert!(!bundle.path_allowed("/cart"));
        assert!(bundle.restricts_targets());
        assert!(bundle.element_matches(Some("add-to-cart"), None));
        assert!(!bundle.element_matches(Some("other"), Some("div")));
    }

    #[test]
    fn css_literals_and_patterns() {
        let mut bundle = FocusFilterBundle::default();
        bundle.absorb_trigger(vec![
            Condition::CssPathEquals("#cart > button:nth-of-type(1)".into()),
            css(r"^#checkout\b"),
        ]);
        assert!(bundle.element_matches(None, Some("#cart > button:nth-of-type(1)")));
        assert!(bundle.element_matches(None, Some("#checkout > form:nth-of-type(1)")));
        assert!(!bundle.element_matches(None, Some("#checkoutx")));
    }

    #[test]
    fn unconstrained_trigger_adds_nothing() {
        let mut bundle = FocusFilterBundle::default();
        bundle.absorb_trigger(vec![
            Condition::PathEquals("/product".into()),
            Condition::IdEquals("buy".into()),
        ]);
        bundle.absorb_trigger(vec![]);
        assert!(!bundle.path_allowed("/elsewhere"));
        assert!(bundle.path_allowed("/product"));
        assert!(bundle.restricts_targets());
        assert!(bundle.ids().contains("buy"));
    }

    #[test]
    fn filters_from_different_triggers_union_per_dimension() {
        let mut bundle = FocusFilterBundle::default();
        bundle.absorb_trigger(vec![Condition::IdEquals("add-to-cart".into())]);
        bundle.absorb_trigger(vec![Condition::PathEquals("/cart".into())]);
        assert!(bundle.restricts_paths());
        assert!(bundle.restricts_targets());
        assert!(!bundle.path_allowed("/product"));
        assert!(bundle.path_allowed("/cart"));
        assert!(!bundle.element_matches(Some("wishlist"), None));
    }

    #[test]
    fn duplicates_collapse() {
        let mut bundle = FocusFilterBundle::default();
        for _ in 0..2 {
            bundle.absorb_trigger(vec![
                css("^#a"),
                Condition::TimeOnPage(TimeThreshold::from_seconds(Operator::Gte, 5.0)),
            ]);
        }
        assert_eq!(bundle.css_patterns().len(), 1);
        assert_eq!(bundle.armed_thresholds().count(), 1);
    }

    #[test]
    fn session_any_of() {
        let mut bundle = FocusFilterBundle::default();
        bundle.absorb_trigger(vec![Condition::Session(SessionCondition {
            key: "clickCount".into(),
            op: Operator::Gte,
            value: json!(3),
        })]);
        bundle.absorb_trigger(vec![Condition::Session(SessionCondition {
            key: "scrollDepth".into(),
            op: Operator::Gt,
            value: json!(50),
        })]);
        let snap = |v: serde_json::Value| v.as_object().cloned().unwrap();
        assert!(bundle.session_allowed(&snap(json!({"clickCount": 1, "scrollDepth": 80}))));
        assert!(!bundle.session_allowed(&snap(json!({"clickCount": 1, "scrollDepth": 10}))));
        assert!(bundle.tracks_session());
    }

    #[test]
    fn only_lower_bounds_arm() {
        let mut bundle = FocusFilterBundle::default();
        bundle.absorb_trigger(vec![
            Condition::TimeOnPage(TimeThreshold::from_seconds(Operator::Lt, 60.0)),
            Condition::TimeOnPage(TimeThreshold::from_seconds(Operator::Gte, 10.0)),
        ]);
        let armed: Vec<_> = bundle.armed_thresholds().map(|t| t.millis).collect();
        assert_eq!(armed, vec![10_000]);
        assert!(bundle.tracks_session());
    }
}
