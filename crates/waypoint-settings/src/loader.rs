//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AssistantSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `WAYPOINT_*` environment overrides (highest priority)
//!
//! Validation is left to the caller so partial files can be layered.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{AssistantSettings, MAX_COOLDOWN_MS, MAX_DEBOUNCE_MS};

/// Load settings from `path` (if it exists) with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AssistantSettings> {
    let defaults = serde_json::to_value(AssistantSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: AssistantSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and primitives are replaced by `source`,
/// and `null` in `source` keeps the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WAYPOINT_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut AssistantSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` as the variable source.
///
/// Integers must parse and fall inside their range; invalid values are
/// logged and ignored. Empty strings count as unset.
pub fn apply_overrides(settings: &mut AssistantSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let ranged = |name: &str, min: u64, max: u64| {
        let val = string(name)?;
        let parsed = parse_u64_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        parsed
    };

    if let Some(v) = string("WAYPOINT_SITE_ID") {
        settings.site_id = v;
    }
    if let Some(v) = string("WAYPOINT_SESSION_ID") {
        settings.session_id = v;
    }
    if let Some(v) = string("WAYPOINT_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = string("WAYPOINT_SUGGEST_PATH") {
        settings.suggest_path = v;
    }
    if let Some(v) = string("WAYPOINT_CONTRACT_VERSION") {
        settings.contract_version = Some(v);
    }
    if let Some(v) = string("WAYPOINT_FOCUS_SELECTOR") {
        settings.focus_selector = Some(v);
    }
    if let Some(v) = string("WAYPOINT_PANEL_SELECTOR") {
        settings.panel_selector = Some(v);
    }
    if let Some(v) = ranged("WAYPOINT_DEBOUNCE_MS", 0, MAX_DEBOUNCE_MS) {
        settings.debounce_ms = v;
    }
    if let Some(v) = ranged("WAYPOINT_FINAL_COOLDOWN_MS", 0, MAX_COOLDOWN_MS) {
        settings.final_cooldown_ms = v;
    }
    if let Some(v) = ranged("WAYPOINT_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = string("WAYPOINT_BASE_CONTEXT") {
        match serde_json::from_str::<Map<String, Value>>(&v) {
            Ok(map) => settings.base_context = map,
            Err(e) => warn!(key = "WAYPOINT_BASE_CONTEXT", error = %e, "base context is not a JSON object, ignoring"),
        }
    }
    if let Some(v) = string("WAYPOINT_LOG_LEVEL") {
        settings.log_level = v;
    }
    if let Some(val) = string("WAYPOINT_LOG_JSON") {
        match parse_bool(&val) {
            Some(v) => settings.log_json = v,
            None => warn!(key = "WAYPOINT_LOG_JSON", value = %val, "invalid boolean env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn lookup(env: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
        move |name: &str| env.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"baseContext": {"plan": "free", "locale": "en"}});
        let source = serde_json::json!({"baseContext": {"plan": "pro"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["baseContext"]["plan"], "pro");
        assert_eq!(merged["baseContext"]["locale"], "en");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replaces() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/waypoint.json")).unwrap();
        assert_eq!(settings.debounce_ms, AssistantSettings::default().debounce_ms);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypoint.json");
        std::fs::write(
            &path,
            r#"{"siteId": "shop", "sessionId": "v1", "debounceMs": 300, "baseContext": {"plan": "pro"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.site_id, "shop");
        assert_eq!(settings.debounce_ms, 300);
        assert_eq!(settings.final_cooldown_ms, 30_000);
        assert_eq!(settings.base_context["plan"], "pro");
        settings.validate().unwrap();
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypoint.json");
        std::fs::write(&path, "not json").unwrap();
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waypoint.json");
        std::fs::write(&path, r#"{"debounceMs": "fast"}"#).unwrap();
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let env = env_from(&[
            ("WAYPOINT_SITE_ID", "env-site"),
            ("WAYPOINT_DEBOUNCE_MS", "50"),
            ("WAYPOINT_CONTRACT_VERSION", "2"),
            ("WAYPOINT_BASE_CONTEXT", r#"{"tier": "gold"}"#),
            ("WAYPOINT_LOG_JSON", "on"),
        ]);
        let mut settings = AssistantSettings::new("file-site", "sess");
        apply_overrides(&mut settings, lookup(&env));
        assert_eq!(settings.site_id, "env-site");
        assert_eq!(settings.debounce_ms, 50);
        assert_eq!(settings.contract_version.as_deref(), Some("2"));
        assert_eq!(settings.base_context["tier"], "gold");
        assert!(settings.log_json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let env = env_from(&[
            ("WAYPOINT_DEBOUNCE_MS", "999999"),
            ("WAYPOINT_FINAL_COOLDOWN_MS", "soon"),
            ("WAYPOINT_BASE_CONTEXT", "[1,2]"),
            ("WAYPOINT_SITE_ID", ""),
            ("WAYPOINT_LOG_JSON", "sometimes"),
        ]);
        let mut settings = AssistantSettings::new("site", "sess");
        apply_overrides(&mut settings, lookup(&env));
        assert_eq!(settings.debounce_ms, 150);
        assert_eq!(settings.final_cooldown_ms, 30_000);
        assert!(settings.base_context.is_empty());
        assert_eq!(settings.site_id, "site");
        assert!(!settings.log_json);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("150", 0, 10_000), Some(150));
        assert_eq!(parse_u64_range("10001", 0, 10_000), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
        assert_eq!(parse_u64_range(" 7 ", 0, 10), Some(7));
    }
}
