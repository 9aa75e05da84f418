//! Interaction kinds a rule trigger can name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of page interaction the assistant can capture.
///
/// The set is closed: trigger kinds outside it are ignored when the rule
/// index is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A click anywhere in the document.
    DomClick,
    /// A form control's value or a scoped element's text changed.
    InputChange,
    /// A form was submitted.
    Submit,
    /// The page finished loading (scheduled once per assistant start).
    PageLoad,
    /// The SPA route changed without a reload.
    RouteChange,
    /// The visitor crossed a configured time-on-page threshold.
    TimeSpent,
}

impl EventKind {
    /// Every kind a rule trigger may name.
    pub const SCOPED: [EventKind; 6] = [
        Self::DomClick,
        Self::InputChange,
        Self::Submit,
        Self::PageLoad,
        Self::RouteChange,
        Self::TimeSpent,
    ];

    /// Kinds listened to when no rule index is available.
    pub const PERMISSIVE: [EventKind; 5] = [
        Self::DomClick,
        Self::InputChange,
        Self::Submit,
        Self::PageLoad,
        Self::RouteChange,
    ];

    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DomClick => "dom_click",
            Self::InputChange => "input_change",
            Self::Submit => "submit",
            Self::PageLoad => "page_load",
            Self::RouteChange => "route_change",
            Self::TimeSpent => "time_spent",
        }
    }

    /// Whether this kind originates from a native DOM listener.
    ///
    /// `page_load`, `route_change` and `time_spent` are synthesized by the
    /// engine itself and never carry a user-chosen target.
    #[must_use]
    pub fn is_listener_driven(self) -> bool {
        matches!(self, Self::DomClick | Self::InputChange | Self::Submit)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger named a kind outside [`EventKind::SCOPED`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported event kind: {0}")]
pub struct ParseEventKindError(pub String);

impl FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SCOPED
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEventKindError(s.to_string()))
    }
}
