//! # waypoint-core
//!
//! Shared vocabulary for the Waypoint in-page assistant.
//!
//! Every other Waypoint crate depends on this one:
//!
//! - **Event kinds**: [`EventKind`], the closed set of interaction kinds a rule
//!   can trigger on
//! - **Rules**: [`rules::RuleListItem`], [`rules::RuleTrigger`] and the raw
//!   wire form of a condition
//! - **Telemetry**: [`telemetry::TelemetryRecord`], the fact record sent to the
//!   rule backend
//! - **Suggestions**: [`suggestion::Suggestion`] and [`suggestion::CtaSpec`]
//! - **API payloads**: request/response bodies for the rule and suggest
//!   endpoints
//! - **Assistant events**: [`events::AssistantEvent`], the observable side
//!   effects emitted to the host
//! - **Logging**: `tracing` subscriber setup and a capture layer for tests

#![deny(unsafe_code)]

pub mod api;
pub mod events;
pub mod ids;
pub mod kinds;
pub mod logging;
pub mod rules;
pub mod suggestion;
pub mod telemetry;
pub mod text;

pub use events::{AssistantEvent, ErrorStage};
pub use ids::{RequestId, SessionId};
pub use kinds::{EventKind, ParseEventKindError};
