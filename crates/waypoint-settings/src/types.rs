//! The settings shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, SettingsError};

/// Upper bound for `debounceMs`.
pub const MAX_DEBOUNCE_MS: u64 = 10_000;
/// Upper bound for `finalCooldownMs`.
pub const MAX_COOLDOWN_MS: u64 = 3_600_000;

/// Options for one assistant instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistantSettings {
    /// Site the assistant is embedded in. Required.
    pub site_id: String,
    /// Visitor session. Required.
    pub session_id: String,
    /// Backend origin, without trailing slash.
    pub api_base_url: String,
    /// Path of the first-batch suggest endpoint (`/suggest` or `/suggest/get`).
    pub suggest_path: String,
    /// Sent as `X-Contract-Version` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_version: Option<String>,
    /// Where the panel is mounted. Purely informational for renderers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_selector: Option<String>,
    /// Target of the initial `page_load` evaluation; the body when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_selector: Option<String>,
    /// Trailing debounce window for captured events.
    pub debounce_ms: u64,
    /// Quiet period after every render.
    pub final_cooldown_ms: u64,
    /// Per-request timeout for backend calls.
    pub request_timeout_ms: u64,
    /// Merged into every rule check as `context`.
    pub base_context: Map<String, Value>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit logs as JSON lines instead of compact text.
    pub log_json: bool,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            site_id: String::new(),
            session_id: String::new(),
            api_base_url: "http://localhost:8000".to_string(),
            suggest_path: "/suggest".to_string(),
            contract_version: None,
            panel_selector: None,
            focus_selector: None,
            debounce_ms: 150,
            final_cooldown_ms: 30_000,
            request_timeout_ms: 10_000,
            base_context: Map::new(),
            log_level: "warn".to_string(),
            log_json: false,
        }
    }
}

impl AssistantSettings {
    /// Settings with the two required ids filled in and everything else
    /// defaulted.
    #[must_use]
    pub fn new(site_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Check required fields and ranges.
    pub fn validate(&self) -> Result<()> {
        if self.site_id.trim().is_empty() {
            return Err(SettingsError::InvalidValue("siteId is required".into()));
        }
        if self.session_id.trim().is_empty() {
            return Err(SettingsError::InvalidValue("sessionId is required".into()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("apiBaseUrl is required".into()));
        }
        if !self.suggest_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "suggestPath must start with '/': {}",
                self.suggest_path
            )));
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(SettingsError::InvalidValue(format!(
                "debounceMs {} exceeds {MAX_DEBOUNCE_MS}",
                self.debounce_ms
            )));
        }
        if self.final_cooldown_ms > MAX_COOLDOWN_MS {
            return Err(SettingsError::InvalidValue(format!(
                "finalCooldownMs {} exceeds {MAX_COOLDOWN_MS}",
                self.final_cooldown_ms
            )));
        }
        Ok(())
    }

    /// `apiBaseUrl` joined with `path`, tolerating a trailing slash on the
    /// base.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = AssistantSettings::default();
        assert_eq!(s.debounce_ms, 150);
        assert_eq!(s.final_cooldown_ms, 30_000);
        assert_eq!(s.suggest_path, "/suggest");
        assert!(s.base_context.is_empty());
    }

    #[test]
    fn defaults_fail_validation_without_ids() {
        let err = AssistantSettings::default().validate().unwrap_err();
        assert_matches!(err, SettingsError::InvalidValue(ref m) if m.contains("siteId"));

        let err = AssistantSettings {
            site_id: "s".into(),
            ..AssistantSettings::default()
        }
        .validate()
        .unwrap_err();
        assert_matches!(err, SettingsError::InvalidValue(ref m) if m.contains("sessionId"));
    }

    #[test]
    fn new_is_valid() {
        AssistantSettings::new("site", "sess").validate().unwrap();
    }

    #[test]
    fn ranges_are_checked() {
        let mut s = AssistantSettings::new("site", "sess");
        s.debounce_ms = MAX_DEBOUNCE_MS + 1;
        assert!(s.validate().is_err());

        let mut s = AssistantSettings::new("site", "sess");
        s.suggest_path = "suggest".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let mut s = AssistantSettings::new("a", "b");
        s.api_base_url = "https://api.test/".into();
        assert_eq!(s.endpoint("/rule/check"), "https://api.test/rule/check");
    }

    #[test]
    fn camel_case_wire_form() {
        let json = serde_json::to_value(AssistantSettings::new("a", "b")).unwrap();
        assert_eq!(json["siteId"], "a");
        assert_eq!(json["finalCooldownMs"], 30_000);
        assert!(json.get("contractVersion").is_none());
    }
}
