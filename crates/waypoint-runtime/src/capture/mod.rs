//! Event capture: gating, debounce, mutation scope and time thresholds.

pub mod debounce;
pub mod engine;
pub mod gate;
pub mod mutation;
pub mod time;

pub use debounce::Debouncer;
pub use engine::{Capture, CaptureEngine, PageEvent};
pub use gate::{GateDecision, admit};
pub use mutation::MutationScope;
pub use time::TimeTracker;
