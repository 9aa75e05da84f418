//! Suggestions and call-to-action specs returned by the suggest endpoints.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Step a suggestion belongs to when `meta.step` is absent.
pub const DEFAULT_STEP: u32 = 1;

/// One suggestion card within a flow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Suggestion id, the target of a CTA's `nextId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Agent-defined card type.
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: String,
    /// Card title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Card body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Flow metadata (`step`) plus anything else the backend attaches.
    #[serde(default, deserialize_with = "null_default")]
    pub meta: SuggestionMeta,
    /// The card's main button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_cta: Option<CtaSpec>,
    /// Pipeline run instead of `primaryCta`'s own handler when that CTA is
    /// clicked.
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub primary_actions: Vec<CtaSpec>,
    /// Secondary buttons.
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub secondary_actions: Vec<CtaSpec>,
    /// Secondary buttons under their older name.
    #[serde(
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "Vec::is_empty",
        alias = "secondaryCta"
    )]
    pub secondary_ctas: Vec<CtaSpec>,
    /// Quick actions (chips).
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<CtaSpec>,
}

impl Suggestion {
    /// Flow step this suggestion renders in.
    #[must_use]
    pub fn step(&self) -> u32 {
        self.meta.step.unwrap_or(DEFAULT_STEP)
    }

    /// Every CTA a visitor can click on this card, primary first.
    pub fn clickable_ctas(&self) -> impl Iterator<Item = &CtaSpec> {
        self.primary_cta
            .iter()
            .chain(&self.secondary_actions)
            .chain(&self.secondary_ctas)
            .chain(&self.actions)
    }

    /// Whether `cta` structurally belongs to this card.
    #[must_use]
    pub fn owns(&self, cta: &CtaSpec) -> bool {
        let signature = cta.signature();
        self.clickable_ctas().any(|c| c.signature() == signature)
    }

    /// Whether clicking `cta` should run the `primaryActions` pipeline.
    #[must_use]
    pub fn runs_pipeline_for(&self, cta: &CtaSpec) -> bool {
        !self.primary_actions.is_empty()
            && self
                .primary_cta
                .as_ref()
                .is_some_and(|primary| primary.signature() == cta.signature())
    }
}

/// `meta` object of a suggestion.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionMeta {
    /// Flow step (1-based).
    #[serde(
        default,
        deserialize_with = "lenient_step",
        skip_serializing_if = "Option::is_none"
    )]
    pub step: Option<u32>,
    /// Remaining metadata, passed through to the renderer.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Treat an explicit `null` like a missing key.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `2`, `2.0` or `"2"` for a step number; anything else means none.
fn lenient_step<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(step_from_value))
}

fn step_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(whole_float_to_u64)
            })
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_float_to_u64(f: f64) -> u64 {
    f as u64
}

/// What a CTA does when executed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CtaKind {
    /// Set a form control's value and fire `input`/`change`.
    DomFill,
    /// Dispatch a click on a selector match.
    Click,
    /// Navigate to `url`.
    Open,
    /// Navigate to `href`/`url`, honouring `target`.
    #[default]
    Link,
    /// In-page navigation through the history adapter.
    Route,
    /// Record a choice and ask the backend for the next step.
    Choose,
    /// Do nothing; used by buttons that only advance or close the flow.
    Noop,
    /// Any other kind; executed as a logged no-op unless a host executor
    /// handles it.
    Other(String),
}

impl CtaKind {
    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::DomFill => "dom_fill",
            Self::Click => "click",
            Self::Open => "open",
            Self::Link => "link",
            Self::Route => "route",
            Self::Choose => "choose",
            Self::Noop => "noop",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for CtaKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "dom_fill" => Self::DomFill,
            "click" => Self::Click,
            "open" => Self::Open,
            "link" => Self::Link,
            "route" => Self::Route,
            "choose" => Self::Choose,
            "noop" => Self::Noop,
            _ => Self::Other(s),
        }
    }
}

impl From<CtaKind> for String {
    fn from(kind: CtaKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A user-actionable step attached to a suggestion.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtaSpec {
    /// Handler to run.
    #[serde(default, deserialize_with = "null_default")]
    pub kind: CtaKind,
    /// Button label.
    #[serde(default, deserialize_with = "null_default")]
    pub label: String,
    /// Handler-specific payload (`{selector, value}`, `{name: value}`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Navigation target for `open`/`link`/`route`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Alias of `url` used by link-style CTAs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Browsing context for `link` (`_self`, `_blank`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// In-page route for `route` CTAs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Sub-pipeline executed in order after this CTA's own handler.
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub run: Vec<CtaSpec>,
    /// Jump to this step after execution.
    #[serde(
        default,
        deserialize_with = "lenient_step",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_step: Option<u32>,
    /// Older spelling of `nextStep`.
    #[serde(
        default,
        deserialize_with = "lenient_step",
        skip_serializing_if = "Option::is_none"
    )]
    pub advance_to: Option<u32>,
    /// Jump to the step of the suggestion with this id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<String>,
    /// Close the panel after execution.
    #[serde(
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub next_close: bool,
}

impl CtaSpec {
    /// Structural identity: `kind|label|payload|url`.
    ///
    /// CTAs reach the controller as values (the renderer hands back what it
    /// was given), so ownership is resolved by comparing signatures.
    #[must_use]
    pub fn signature(&self) -> String {
        let payload = self
            .payload
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        format!(
            "{}|{}|{}|{}",
            self.kind.as_str(),
            self.label,
            payload,
            self.url.as_deref().unwrap_or_default()
        )
    }

    /// Explicit step jump, `nextStep` winning over `advanceTo`.
    #[must_use]
    pub fn step_target(&self) -> Option<u32> {
        self.next_step.or(self.advance_to)
    }

    /// Navigation target: `url`, then `href`, then `payload.url`.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or(self.href.as_deref())
            .or_else(|| self.payload_str("url"))
            .filter(|u| !u.trim().is_empty())
    }

    /// In-page route: `route`, falling back to [`destination`](Self::destination).
    #[must_use]
    pub fn route_target(&self) -> Option<&str> {
        self.route
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| self.destination())
    }

    /// Read a string field out of an object payload.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.as_ref()?.get(key)?.as_str()
    }
}
