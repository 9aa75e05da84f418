//! Validated rule conditions.
//!
//! A [`RawCondition`] from the wire is compiled once into a [`Condition`],
//! keyed by what the client can do with it. Anything the client cannot use
//! is rejected here and left to the backend.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde_json::{Map, Value};
use waypoint_core::rules::RawCondition;
use waypoint_core::text::normalize_path;

use crate::errors::{Result, RuleError};

/// Field carrying the normalized page path.
pub const FIELD_PATH: &str = "telemetry.attributes.path";
/// Field carrying the target element id.
pub const FIELD_ID: &str = "telemetry.attributes.id";
/// Field carrying the target's CSS path.
pub const FIELD_CSS_PATH: &str = "telemetry.cssPath";
/// Canonical time-on-page field.
pub const FIELD_SESSION_TIME: &str = "session.timeOnPage";
/// Time-on-page as rule authors are told to write it.
pub const FIELD_ATTR_TIME: &str = "telemetry.attributes.timeOnPage";

const SESSION_PREFIX: &str = "session.";

// ─────────────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────────────

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    /// `equals` (alias `eq`).
    Equals,
    /// `gt`
    Gt,
    /// `gte`
    Gte,
    /// `lt`
    Lt,
    /// `lte`
    Lte,
    /// `contains`
    Contains,
    /// `in`
    In,
    /// `regex`
    Regex,
    /// `between`, inclusive `[lo, hi]`.
    Between,
}

impl Operator {
    /// Canonical wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::In => "in",
            Self::Regex => "regex",
            Self::Between => "between",
        }
    }

    fn compare(self, actual: f64, expected: f64) -> bool {
        match self {
            Self::Gt => actual > expected,
            Self::Gte => actual >= expected,
            Self::Lt => actual < expected,
            Self::Lte => actual <= expected,
            Self::Equals => (actual - expected).abs() < f64::EPSILON,
            _ => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equals" | "eq" => Ok(Self::Equals),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "contains" => Ok(Self::Contains),
            "in" => Ok(Self::In),
            "regex" => Ok(Self::Regex),
            "between" => Ok(Self::Between),
            other => Err(RuleError::UnknownOperator(other.to_owned())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Condition payloads
// ─────────────────────────────────────────────────────────────────────────────

/// A compiled CSS-path pattern. Compares by source text.
#[derive(Clone, Debug)]
pub struct CssPattern(Regex);

impl CssPattern {
    /// Compile `source`.
    pub fn new(source: &str) -> Result<Self> {
        Ok(Self(Regex::new(source)?))
    }

    /// Pattern source.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Whether `css_path` matches.
    pub fn is_match(&self, css_path: &str) -> bool {
        self.0.is_match(css_path)
    }
}

impl PartialEq for CssPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for CssPattern {}

/// A time-on-page threshold.
///
/// Stored in whole milliseconds so thresholds can be ordered and deduplicated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeThreshold {
    /// Threshold in milliseconds.
    pub millis: u64,
    /// One of `gt`, `gte`, `lt`, `lte`, `equals`.
    pub op: Operator,
}

impl TimeThreshold {
    /// Threshold of `seconds` (fractional allowed, negatives clamp to 0).
    pub fn from_seconds(op: Operator, seconds: f64) -> Self {
        Self {
            millis: seconds_to_millis(seconds),
            op,
        }
    }

    /// Whether this threshold schedules a `time_spent` timer. Upper bounds
    /// (`lt`, `lte`) only constrain and never fire on their own.
    pub fn arms_timer(&self) -> bool {
        matches!(self.op, Operator::Gt | Operator::Gte | Operator::Equals)
    }

    /// Whether `elapsed_ms` of time on page satisfies the threshold for
    /// firing. `equals` fires once the mark is reached; `gt` only strictly
    /// after it.
    pub fn is_crossed(&self, elapsed_ms: u64) -> bool {
        match self.op {
            Operator::Gt => elapsed_ms > self.millis,
            Operator::Gte | Operator::Equals => elapsed_ms >= self.millis,
            _ => false,
        }
    }

    /// Earliest elapsed time, in milliseconds, at which the threshold can
    /// be crossed.
    pub fn due_at_ms(&self) -> u64 {
        match self.op {
            Operator::Gt => self.millis.saturating_add(1),
            _ => self.millis,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn seconds_to_millis(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0).round().min(u64::MAX as f64) as u64
}

/// A condition on any other `session.*` attribute, evaluated by the
/// operand's type.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionCondition {
    /// Attribute name without the `session.` prefix.
    pub key: String,
    /// Operator.
    pub op: Operator,
    /// Operand as sent.
    pub value: Value,
}

impl SessionCondition {
    /// Evaluate against a session snapshot. A missing attribute never matches.
    pub fn matches(&self, session: &Map<String, Value>) -> bool {
        let Some(actual) = session.get(&self.key) else {
            return false;
        };
        match (&self.value, self.op) {
            (Value::String(expected), Operator::Contains) => {
                value_text(actual).is_some_and(|a| a.contains(expected.as_str()))
            }
            (Value::String(expected), Operator::In) => value_text(actual)
                .is_some_and(|a| expected.split(',').any(|part| part.trim() == a)),
            (Value::String(expected), _) => value_text(actual).is_some_and(|a| a == *expected),
            (Value::Array(items), Operator::In) => {
                let actual_text = value_text(actual);
                items.iter().any(|item| {
                    item == actual || (actual_text.is_some() && value_text(item) == actual_text)
                })
            }
            (Value::Array(bounds), Operator::Between) => {
                match (bounds.first().and_then(as_number), bounds.get(1).and_then(as_number)) {
                    (Some(lo), Some(hi)) => as_number(actual).is_some_and(|a| a >= lo && a <= hi),
                    _ => false,
                }
            }
            (Value::Number(expected), op) => match (as_number(actual), expected.as_f64()) {
                (Some(a), Some(e)) => op.compare(a, e),
                _ => false,
            },
            (expected, _) => expected == actual,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Condition
// ─────────────────────────────────────────────────────────────────────────────

/// A condition the client can act on.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Current path equals this normalized path.
    PathEquals(String),
    /// Target (or an ancestor) has this id.
    IdEquals(String),
    /// Target (or an ancestor) has exactly this CSS path.
    CssPathEquals(String),
    /// Target (or an ancestor) CSS path matches.
    CssPathMatches(CssPattern),
    /// Time on page threshold.
    TimeOnPage(TimeThreshold),
    /// Generic session attribute test.
    Session(SessionCondition),
}

impl Condition {
    /// Compile a wire condition.
    pub fn compile(raw: &RawCondition) -> Result<Self> {
        let op: Operator = raw.op.parse()?;
        let field = raw.field.trim();
        let unsupported = || RuleError::Unsupported {
            field: field.to_owned(),
            op: op.as_str().to_owned(),
        };

        match (field, op) {
            (FIELD_PATH, Operator::Equals) => {
                Ok(Self::PathEquals(normalize_path(&expect_text(field, &raw.value)?)))
            }
            (FIELD_ID, Operator::Equals) => Ok(Self::IdEquals(expect_text(field, &raw.value)?)),
            (FIELD_CSS_PATH, Operator::Equals) => {
                Ok(Self::CssPathEquals(expect_text(field, &raw.value)?))
            }
            (FIELD_CSS_PATH, Operator::Regex) => Ok(Self::CssPathMatches(CssPattern::new(
                &expect_text(field, &raw.value)?,
            )?)),
            (
                FIELD_SESSION_TIME | FIELD_ATTR_TIME,
                Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte | Operator::Equals,
            ) => {
                let seconds = as_number(&raw.value).ok_or_else(|| RuleError::InvalidValue {
                    field: field.to_owned(),
                    reason: format!("expected seconds, got {}", raw.value),
                })?;
                Ok(Self::TimeOnPage(TimeThreshold::from_seconds(op, seconds)))
            }
            (FIELD_SESSION_TIME | FIELD_ATTR_TIME, _) => Err(unsupported()),
            (f, _) if f.starts_with(SESSION_PREFIX) => {
                let key = &f[SESSION_PREFIX.len()..];
                if key.is_empty() {
                    return Err(unsupported());
                }
                if op == Operator::Between && !is_numeric_pair(&raw.value) {
                    return Err(RuleError::InvalidValue {
                        field: field.to_owned(),
                        reason: "between expects [lo, hi]".to_owned(),
                    });
                }
                Ok(Self::Session(SessionCondition {
                    key: key.to_owned(),
                    op,
                    value: raw.value.clone(),
                }))
            }
            _ => Err(unsupported()),
        }
    }
}

fn expect_text(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_owned()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(RuleError::InvalidValue {
            field: field.to_owned(),
            reason: format!("expected a non-empty string, got {other}"),
        }),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_numeric_pair(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.len() == 2 && items.iter().all(|v| as_number(v).is_some()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
