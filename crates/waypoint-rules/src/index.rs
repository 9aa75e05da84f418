//! The rule focus index.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use waypoint_core::EventKind;
use waypoint_core::rules::RuleListItem;

use crate::bundle::FocusFilterBundle;
use crate::condition::Condition;
use crate::errors::RuleError;

/// Filters for every event kind the rule set cares about.
///
/// Built once per rule-list fetch and read-only afterwards. When no tracked
/// rule names a supported kind (or the fetch failed) the index falls back to
/// [`EventKind::PERMISSIVE`] with no filters at all.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleFocusIndex {
    bundles: BTreeMap<EventKind, FocusFilterBundle>,
    fallback: bool,
}

impl RuleFocusIndex {
    /// Compile the rule list.
    pub fn build(rules: &[RuleListItem]) -> Self {
        let mut bundles: BTreeMap<EventKind, FocusFilterBundle> = BTreeMap::new();

        for rule in rules.iter().filter(|r| r.contributes_to_focus()) {
            for trigger in &rule.triggers {
                let kind: EventKind = match trigger.event_kind.parse() {
                    Ok(kind) => kind,
                    Err(e) => {
                        debug!(rule_id = %rule.id, error = %e, "skipping trigger");
                        continue;
                    }
                };

                let conditions = trigger
                    .conditions
                    .iter()
                    .filter_map(|raw| match Condition::compile(raw) {
                        Ok(condition) => Some(condition),
                        Err(e @ RuleError::Unsupported { .. }) => {
                            debug!(rule_id = %rule.id, error = %e, "condition left to backend");
                            None
                        }
                        Err(e) => {
                            warn!(rule_id = %rule.id, field = %raw.field, error = %e, "dropping invalid condition");
                            None
                        }
                    })
                    .collect();

                bundles.entry(kind).or_default().absorb_trigger(conditions);
            }
        }

        if bundles.is_empty() {
            info!(rule_count = rules.len(), "no tracked triggers, using permissive fallback");
            return Self::permissive();
        }

        info!(
            rule_count = rules.len(),
            kinds = ?bundles.keys().collect::<Vec<_>>(),
            "rule focus index built"
        );
        Self {
            bundles,
            fallback: false,
        }
    }

    /// Permissive fallback: the five listener-friendly kinds, no filters.
    pub fn permissive() -> Self {
        Self {
            bundles: EventKind::PERMISSIVE
                .into_iter()
                .map(|kind| (kind, FocusFilterBundle::default()))
                .collect(),
            fallback: true,
        }
    }

    /// Whether this is the permissive fallback.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Allowed kinds, in a stable order.
    pub fn allowed_kinds(&self) -> Vec<EventKind> {
        self.bundles.keys().copied().collect()
    }

    /// Filters for `kind`, if allowed.
    pub fn bundle(&self, kind: EventKind) -> Option<&FocusFilterBundle> {
        self.bundles.get(&kind)
    }

    /// Whether any allowed kind needs session counters in its telemetry.
    pub fn tracks_session(&self) -> bool {
        self.bundles.values().any(FocusFilterBundle::tracks_session)
    }
}

impl Default for RuleFocusIndex {
    fn default() -> Self {
        Self::permissive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(value: serde_json::Value) -> Vec<RuleListItem> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn equals_only_rules_yield_exact_values() {
        let index = RuleFocusIndex::build(&rules(json!([
            {"id": "r1", "tracking": true, "triggers": [{
                "eventKind": "dom_click",
                "conditions": [
                    {"field": "telemetry.attributes.id", "operator": "equals", "value": "add-to-cart"},
                    {"field": "telemetry.attributes.path", "operator": "equals", "value": "/product"}
                ]
            }]},
            {"id": "r2", "tracking": true, "triggers": [{
                "eventKind": "dom_click",
                "conditions": [
                    {"field": "telemetry.attributes.id", "operator": "equals", "value": "wishlist"},
                    {"field": "telemetry.attributes.path", "operator": "equals", "value": "/product/"}
                ]
            }]}
        ])));

        assert!(!index.is_fallback());
        assert_eq!(index.allowed_kinds(), vec![EventKind::DomClick]);
        let bundle = index.bundle(EventKind::DomClick).unwrap();
        let ids: Vec<_> = bundle.ids().iter().cloned().collect();
        assert_eq!(ids, vec!["add-to-cart", "wishlist"]);
        let paths: Vec<_> = bundle.paths().iter().cloned().collect();
        assert_eq!(paths, vec!["/product"]);
    }

    #[test]
    fn untracked_disabled_and_unknown_are_ignored() {
        let index = RuleFocusIndex::build(&rules(json!([
            {"id": "a", "tracking": false, "triggers": [{"eventKind": "submit"}]},
            {"id": "b", "tracking": true, "enabled": false, "triggers": [{"eventKind": "submit"}]},
            {"id": "c", "tracking": true, "triggers": [{"eventKind": "hover"}]}
        ])));
        assert!(index.is_fallback());
        assert_eq!(index.allowed_kinds().len(), 5);
        assert!(index.bundle(EventKind::TimeSpent).is_none());
    }

    #[test]
    fn invalid_conditions_are_dropped_not_fatal() {
        let index = RuleFocusIndex::build(&rules(json!([
            {"id": "r", "tracking": true, "triggers": [{
                "eventType": "input_change",
                "when": [
                    {"field": "telemetry.cssPath", "op": "regex", "value": "(["},
                    {"field": "telemetry.cssPath", "op": "regex", "value": "^#qty"}
                ]
            }]}
        ])));
        let bundle = index.bundle(EventKind::InputChange).unwrap();
        assert_eq!(bundle.css_patterns().len(), 1);
        assert_eq!(bundle.css_patterns()[0].as_str(), "^#qty");
    }

    #[test]
    fn time_spent_and_session_tracking() {
        let index = RuleFocusIndex::build(&rules(json!([
            {"id": "t", "tracking": true, "triggers": [{
                "eventKind": "time_spent",
                "conditions": [
                    {"field": "telemetry.attributes.timeOnPage", "operator": "gte", "value": 30},
                    {"field": "session.timeOnPage", "operator": "gt", "value": 90}
                ]
            }]}
        ])));
        assert_eq!(index.allowed_kinds(), vec![EventKind::TimeSpent]);
        assert!(index.tracks_session());
        let millis: Vec<_> = index
            .bundle(EventKind::TimeSpent)
            .unwrap()
            .armed_thresholds()
            .map(|t| t.millis)
            .collect();
        assert_eq!(millis, vec![30_000, 90_000]);
    }

    #[test]
    fn empty_list_is_permissive() {
        let index = RuleFocusIndex::build(&[]);
        assert_eq!(index, RuleFocusIndex::permissive());
        assert!(index.bundle(EventKind::DomClick).unwrap().path_allowed("/x"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use waypoint_core::rules::{RawCondition, RuleTrigger};

        const FIELDS: &[&str] = &[
            "telemetry.attributes.id",
            "telemetry.attributes.path",
            "telemetry.cssPath",
            "session.timeOnPage",
            "session.clickCount",
            "telemetry.elementText",
        ];
        const OPS: &[&str] = &["equals", "eq", "gt", "gte", "lt", "regex", "contains", "in", "nope"];
        const KINDS: &[&str] = &[
            "dom_click",
            "input_change",
            "submit",
            "page_load",
            "route_change",
            "time_spent",
            "hover",
        ];

        fn condition() -> impl Strategy<Value = RawCondition> {
            (
                prop::sample::select(FIELDS),
                prop::sample::select(OPS),
                prop_oneof![
                    "[a-z#>/ -]{0,12}".prop_map(serde_json::Value::from),
                    (0u32..120).prop_map(serde_json::Value::from),
                ],
            )
                .prop_map(|(f, o, v)| RawCondition::new(f, o, v))
        }

        fn rule() -> impl Strategy<Value = RuleListItem> {
            (
                "[a-z]{1,6}",
                any::<bool>(),
                any::<bool>(),
                prop::collection::vec(
                    (
                        prop::sample::select(KINDS),
                        prop::collection::vec(condition(), 0..4),
                    ),
                    0..3,
                ),
            )
                .prop_map(|(id, enabled, tracking, triggers)| RuleListItem {
                    id,
                    enabled,
                    tracking,
                    triggers: triggers
                        .into_iter()
                        .map(|(kind, conditions)| RuleTrigger {
                            event_kind: kind.to_owned(),
                            conditions,
                        })
                        .collect(),
                })
        }

        proptest! {
            #[test]
            fn rebuild_is_idempotent(rules in prop::collection::vec(rule(), 0..6)) {
                prop_assert_eq!(RuleFocusIndex::build(&rules), RuleFocusIndex::build(&rules));
            }

            #[test]
            fn duplicated_rules_build_the_same_index(rules in prop::collection::vec(rule(), 0..6)) {
                let doubled: Vec<_> = rules.iter().chain(rules.iter()).cloned().collect();
                prop_assert_eq!(RuleFocusIndex::build(&doubled), RuleFocusIndex::build(&rules));
            }

            #[test]
            fn allowed_kinds_are_never_empty(rules in prop::collection::vec(rule(), 0..6)) {
                prop_assert!(!RuleFocusIndex::build(&rules).allowed_kinds().is_empty());
            }
        }
    }
}
