//! # waypoint-rules
//!
//! Turns the site's rule list into client-side focus filters.
//!
//! The backend remains the authority on whether a rule matches. The index
//! built here only narrows what the client bothers to send: which event kinds
//! get listeners, which paths and elements are interesting, when time-based
//! triggers should fire, and which session states qualify.
//!
//! - [`Condition`]: one validated `{field, op, value}` triple
//! - [`FocusFilterBundle`]: all filters for one event kind
//! - [`RuleFocusIndex`]: bundles for every allowed kind, or the permissive
//!   fallback

#![deny(unsafe_code)]

pub mod bundle;
pub mod condition;
pub mod errors;
pub mod index;

pub use bundle::FocusFilterBundle;
pub use condition::{Condition, CssPattern, Operator, SessionCondition, TimeThreshold};
pub use errors::{Result, RuleError};
pub use index::RuleFocusIndex;
