//! # waypoint-settings
//!
//! Configuration for an embedded assistant instance.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AssistantSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `WAYPOINT_*` overrides (highest priority)
//!
//! `siteId` and `sessionId` have no sensible default; [`AssistantSettings::validate`]
//! rejects a configuration that leaves them empty.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_overrides, deep_merge, load_settings_from_path};
pub use types::AssistantSettings;
