//! # waypoint-runtime
//!
//! The running assistant.
//!
//! - [`capture`]: gating, debouncing and time thresholds for page events
//! - [`flow`]: multi-step suggestion state and CTA pipelines
//! - [`assistant`]: the actor tying both to the backend and the host page
//!
//! Hosts build an [`AutoAssistant`], feed it [`PageEvent`]s through the
//! returned [`AssistantHandle`] and observe [`AssistantEvent`]s.
//!
//! [`AssistantEvent`]: waypoint_core::AssistantEvent

#![deny(unsafe_code)]

pub mod assistant;
pub mod capture;
pub mod errors;
pub mod events;
pub mod executor;
pub mod flow;
pub mod listeners;
pub mod navigation;
pub mod render;

pub use assistant::{AssistantBuilder, AssistantHandle, AssistantStatus, AutoAssistant};
pub use capture::{CaptureEngine, MutationScope, PageEvent};
pub use errors::{Result, RuntimeError};
pub use events::EventBus;
pub use executor::CtaExecutor;
pub use flow::FlowController;
pub use listeners::{ListenerRegistry, ListenerSet};
pub use navigation::{HistoryBackend, HistoryNavigation, NavigationObserver, RouteCause, RouteChange};
pub use render::{Frame, MemoryRenderer, Renderer};
