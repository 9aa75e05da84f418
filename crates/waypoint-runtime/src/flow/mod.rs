//! Suggestion flow: state, step lookups, CTA pipelines and the
//! controller tying them together.

pub mod controller;
pub mod cta;
pub mod state;
pub mod steps;

pub use controller::{FlowController, PendingFetch};
pub use cta::{CtaContext, CtaOutcome, CtaPlan, run_builtin, run_pipeline};
pub use state::FlowState;
