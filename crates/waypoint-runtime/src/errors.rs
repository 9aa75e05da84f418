//! Runtime error types.

use waypoint_client::ApiError;
use waypoint_dom::DomError;
use waypoint_settings::SettingsError;

/// Errors raised inside the assistant.
///
/// None of these reach the host as a `Result`; they are logged and turned
/// into [`AssistantEvent::Error`](waypoint_core::AssistantEvent::Error).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Backend call failed.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Page operation failed.
    #[error("dom error: {0}")]
    Dom(#[from] DomError),

    /// Settings were rejected at start-up.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// A CTA could not be executed.
    #[error("cta error: {0}")]
    Cta(String),

    /// The assistant was built without a required collaborator.
    #[error("config error: {0}")]
    Config(String),

    /// The renderer refused or panicked.
    #[error("render error: {0}")]
    Render(String),

    /// The assistant task is gone.
    #[error("assistant stopped")]
    Stopped,
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn wraps_lower_layers() {
        let err: RuntimeError = DomError::Navigation("x".into()).into();
        assert!(err.to_string().starts_with("dom error"));

        let err: RuntimeError = ApiError::Status {
            status: 500,
            body: String::new(),
        }
        .into();
        assert_matches!(err, RuntimeError::Api(ApiError::Status { status: 500, .. }));
    }

    #[test]
    fn settings_errors_keep_their_message() {
        let err: RuntimeError = SettingsError::InvalidValue("siteId is required".into()).into();
        assert!(err.to_string().contains("siteId is required"));
    }
}
