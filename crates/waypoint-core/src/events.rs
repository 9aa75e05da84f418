//! Observable side effects emitted to the host.
//!
//! The assistant never throws into host code. Everything the host can react
//! to arrives as an [`AssistantEvent`]: the rule index became ready, a rule
//! check completed, suggestions were rendered, or something failed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kinds::EventKind;
use crate::suggestion::Suggestion;

/// Pipeline stage an error came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    /// Fetching the rule list.
    Rules,
    /// Calling `/rule/check`.
    RuleCheck,
    /// Fetching suggestions for a matched rule.
    Suggest,
    /// Executing a call-to-action.
    Cta,
    /// Handing suggestions to the renderer.
    Render,
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rules => write!(f, "rules"),
            Self::RuleCheck => write!(f, "rule_check"),
            Self::Suggest => write!(f, "suggest"),
            Self::Cta => write!(f, "cta"),
            Self::Render => write!(f, "render"),
        }
    }
}

/// Event emitted by a running assistant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssistantEvent {
    /// The rule index was (re)built and listeners were configured.
    #[serde(rename = "rule:ready", rename_all = "camelCase")]
    RuleReady {
        /// Kinds now being captured.
        allowed_kinds: Vec<EventKind>,
        /// Number of rules in the fetched list.
        rule_count: usize,
        /// Whether the permissive fallback is in effect.
        fallback: bool,
    },

    /// A rule check round trip completed.
    #[serde(rename = "rule:checked", rename_all = "camelCase")]
    RuleChecked {
        /// Kind of the evaluated event.
        event_kind: EventKind,
        /// Backend verdict.
        should_proceed: bool,
        /// Matched rule ids in server order.
        matched_rules: Vec<String>,
        /// Backend explanation, when present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Suggestions were handed to the renderer.
    #[serde(rename = "suggest:ready", rename_all = "camelCase")]
    SuggestReady {
        /// Rule driving the flow.
        rule_id: Option<String>,
        /// Step now rendered.
        step: Option<u32>,
        /// The rendered suggestions.
        suggestions: Vec<Suggestion>,
    },

    /// A stage failed. Never fatal to the host page.
    #[serde(rename = "error")]
    Error {
        /// Failing stage.
        stage: ErrorStage,
        /// Human-readable description.
        message: String,
    },
}

impl AssistantEvent {
    /// Wire name of the event (`rule:ready`, `error`, ...).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RuleReady { .. } => "rule:ready",
            Self::RuleChecked { .. } => "rule:checked",
            Self::SuggestReady { .. } => "suggest:ready",
            Self::Error { .. } => "error",
        }
    }

    /// Build an error event.
    #[must_use]
    pub fn error(stage: ErrorStage, message: impl Into<String>) -> Self {
        Self::Error {
            stage,
            message: message.into(),
        }
    }
}
