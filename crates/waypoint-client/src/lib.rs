//! # waypoint-client
//!
//! The backend seam. [`AssistApi`] is what the runtime calls; [`ApiClient`]
//! implements it over HTTP with `reqwest`.

#![deny(unsafe_code)]

pub mod api;
pub mod errors;
pub mod http;

pub use api::AssistApi;
pub use errors::{ApiError, Result};
pub use http::{ApiClient, parse_suggestions};
