//! Rule definitions as fetched from `GET /rule`.
//!
//! These are the raw wire shapes. They are deliberately loose (`String`
//! kinds and operators, untyped values) because the rule backend is authored
//! independently; validation happens once, when the focus index is built.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response body of `GET /rule?siteId=`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleListResponse {
    /// Rules configured for the site.
    pub rules: Vec<RuleListItem>,
}

/// One rule in the site's rule list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleListItem {
    /// Rule identifier, as returned later in `matchedRules`.
    #[serde(default)]
    pub id: String,
    /// Whether the rule is active at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the client should scope its listeners to this rule's
    /// triggers. Untracked rules never narrow capture.
    #[serde(default)]
    pub tracking: bool,
    /// Trigger declarations.
    #[serde(default)]
    pub triggers: Vec<RuleTrigger>,
}

fn default_true() -> bool {
    true
}

impl RuleListItem {
    /// Whether this rule's triggers should feed the focus index.
    #[must_use]
    pub fn contributes_to_focus(&self) -> bool {
        self.enabled && self.tracking
    }
}

/// Declares when a rule is eligible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTrigger {
    /// Event kind name (`dom_click`, `time_spent`, ...). Unknown names are
    /// kept verbatim and skipped by the index.
    #[serde(alias = "eventType")]
    pub event_kind: String,
    /// Conditions, all of which the backend requires for a match.
    #[serde(default, alias = "when")]
    pub conditions: Vec<RawCondition>,
}

/// A `{field, op, value}` condition exactly as the backend sent it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawCondition {
    /// Dotted path into telemetry or session data.
    pub field: String,
    /// Operator name.
    #[serde(alias = "operator")]
    pub op: String,
    /// Comparison operand.
    #[serde(default)]
    pub value: Value,
}

impl RawCondition {
    /// Convenience constructor, mostly for tests and fixtures.
    #[must_use]
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: op.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_canonical_shape() {
        let item: RuleListItem = serde_json::from_value(json!({
            "id": "r1",
            "tracking": true,
            "triggers": [{
                "eventKind": "dom_click",
                "conditions": [
                    {"field": "telemetry.attributes.id", "operator": "equals", "value": "add-to-cart"}
                ]
            }]
        }))
        .unwrap();
        assert!(item.enabled);
        assert!(item.contributes_to_focus());
        assert_eq!(item.triggers[0].event_kind, "dom_click");
        assert_eq!(item.triggers[0].conditions[0].op, "equals");
    }

    #[test]
    fn parses_backend_aliases() {
        let trigger: RuleTrigger = serde_json::from_value(json!({
            "eventType": "input_change",
            "when": [{"field": "telemetry.attributes.path", "op": "eq", "value": "/cart"}]
        }))
        .unwrap();
        assert_eq!(trigger.event_kind, "input_change");
        assert_eq!(trigger.conditions.len(), 1);
        assert_eq!(trigger.conditions[0].value, json!("/cart"));
    }

    #[test]
    fn untracked_and_disabled_rules_do_not_contribute() {
        let untracked: RuleListItem =
            serde_json::from_value(json!({"id": "a", "triggers": []})).unwrap();
        assert!(!untracked.contributes_to_focus());

        let disabled: RuleListItem =
            serde_json::from_value(json!({"id": "b", "tracking": true, "enabled": false}))
                .unwrap();
        assert!(!disabled.contributes_to_focus());
    }

    #[test]
    fn missing_rules_array_defaults_to_empty() {
        let resp: RuleListResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.rules.is_empty());
    }
}
