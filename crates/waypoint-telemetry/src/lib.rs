//! # waypoint-telemetry
//!
//! Turns "the visitor did something to this element" into the fact record
//! the rule backend evaluates.
//!
//! - [`SessionCounters`]: time on page/site, clicks, scroll depth
//! - [`synthesize`]: element → [`TelemetryRecord`](waypoint_core::telemetry::TelemetryRecord)
//! - [`locator`]: CSS path and XPath computation
//! - [`numeric`]: numeric widget heuristic (cart badges, quantity fields)

#![deny(unsafe_code)]

pub mod locator;
pub mod numeric;
pub mod session;
pub mod synth;

pub use locator::{css_path, xpath};
pub use session::{SessionCounters, SessionSnapshot};
pub use synth::synthesize;
