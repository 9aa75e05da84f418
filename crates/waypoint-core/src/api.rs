//! Request and response bodies for the rule and suggest endpoints.
//!
//! All bodies are camelCase JSON. Response types are lenient (`default`
//! everywhere) because the backend is versioned independently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kinds::EventKind;
use crate::telemetry::TelemetryRecord;

/// The `event` object of a rule check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Captured interaction kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Capture time, epoch milliseconds.
    pub ts: i64,
    /// Synthesized telemetry.
    pub telemetry: TelemetryRecord,
}

impl EventEnvelope {
    /// Envelope stamped with the current wall-clock time.
    #[must_use]
    pub fn now(kind: EventKind, telemetry: TelemetryRecord) -> Self {
        Self {
            kind,
            ts: chrono::Utc::now().timestamp_millis(),
            telemetry,
        }
    }
}

/// Body of `POST /rule/check`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCheckRequest {
    /// Site the assistant is embedded in.
    pub site_id: String,
    /// Visitor session.
    pub session_id: String,
    /// The captured event.
    pub event: EventEnvelope,
    /// Host-supplied base context.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

/// Response of `POST /rule/check`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleCheckResponse {
    /// Event classification echoed by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Matched rule ids; order is server-defined.
    pub matched_rules: Vec<String>,
    /// Whether the client should go on to fetch suggestions.
    pub should_proceed: bool,
    /// Why nothing matched, when the backend says.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Verdict of one rule evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Whether the flow should proceed.
    pub should_proceed: bool,
    /// Matched rule ids in server order.
    pub matched_rule_ids: Vec<String>,
    /// Backend explanation for a negative verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MatchResult {
    /// The primary matched rule: the last id in the list.
    #[must_use]
    pub fn top_rule_id(&self) -> Option<&str> {
        self.matched_rule_ids.last().map(String::as_str)
    }

    /// `matchedRules.join('|')`, used to tell a materially new match from a
    /// noisy repeat.
    #[must_use]
    pub fn signature(&self) -> String {
        self.matched_rule_ids.join("|")
    }
}

impl From<RuleCheckResponse> for MatchResult {
    fn from(resp: RuleCheckResponse) -> Self {
        Self {
            should_proceed: resp.should_proceed,
            matched_rule_ids: resp.matched_rules,
            reason: resp.reason,
        }
    }
}

/// Body of `POST /suggest` (`/suggest/get`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestGetRequest {
    /// Site the assistant is embedded in.
    pub site_id: String,
    /// Current page URL.
    pub url: String,
    /// Rule whose suggestions are requested.
    pub rule_id: String,
}

/// Body of `POST /suggest/next`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestNextRequest {
    /// Site the assistant is embedded in.
    pub site_id: String,
    /// Current page URL.
    pub url: String,
    /// Rule driving the flow.
    pub rule_id: String,
    /// Cumulative choice input.
    pub input: Map<String, Value>,
}

/// Response of both suggest endpoints.
///
/// Suggestions stay untyped here so one malformed card does not reject the
/// whole batch; the client validates them individually.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionsResponse {
    /// Raw suggestion objects.
    pub suggestions: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_rule_is_last_matched() {
        let result = MatchResult {
            should_proceed: true,
            matched_rule_ids: vec!["generic".into(), "specific".into()],
            reason: None,
        };
        assert_eq!(result.top_rule_id(), Some("specific"));
        assert_eq!(result.signature(), "generic|specific");
    }

    #[test]
    fn empty_match_has_no_top_rule() {
        assert_eq!(MatchResult::default().top_rule_id(), None);
        assert_eq!(MatchResult::default().signature(), "");
    }

    #[test]
    fn rule_check_request_shape() {
        let req = RuleCheckRequest {
            site_id: "site".into(),
            session_id: "sess".into(),
            event: EventEnvelope {
                kind: EventKind::DomClick,
                ts: 1_700_000_000_000,
                telemetry: TelemetryRecord::default(),
            },
            context: Map::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["siteId"], "site");
        assert_eq!(json["sessionId"], "sess");
        assert_eq!(json["event"]["type"], "dom_click");
        assert!(json.get("context").is_none());
    }

    #[test]
    fn rule_check_response_is_lenient() {
        let resp: RuleCheckResponse =
            serde_json::from_value(json!({"shouldProceed": true, "matchedRules": ["a"]})).unwrap();
        let result = MatchResult::from(resp);
        assert!(result.should_proceed);
        assert_eq!(result.matched_rule_ids, vec!["a"]);

        let empty: RuleCheckResponse = serde_json::from_value(json!({})).unwrap();
        assert!(!empty.should_proceed);
    }

    #[test]
    fn suggest_next_request_carries_input() {
        let mut input = Map::new();
        let _ = input.insert("size".into(), json!("M"));
        let req = SuggestNextRequest {
            site_id: "s".into(),
            url: "https://shop.test/p".into(),
            rule_id: "r".into(),
            input,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["ruleId"], "r");
        assert_eq!(json["input"]["size"], "M");
    }
}
