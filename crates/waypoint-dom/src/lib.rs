//! # waypoint-dom
//!
//! The assistant never touches a browser directly. Everything it needs from
//! the host page goes through the [`Document`] trait: element lookup,
//! attributes and text for telemetry, form values and synthetic events for
//! call-to-action execution, and navigation.
//!
//! [`MemoryDocument`] is a headless implementation backed by `scraper`. It
//! drives the test suites and the replay harness.

#![deny(unsafe_code)]

pub mod document;
pub mod errors;
pub mod memory;

pub use document::{DomEventKind, Document, NodeId};
pub use errors::{DomError, Result};
pub use memory::{DispatchedEvent, MemoryDocument, Navigation};
