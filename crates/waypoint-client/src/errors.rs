//! Client error types.

use thiserror::Error;

/// Errors from backend calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// 2xx response whose body did not decode.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_error_message_carries_body() {
        let busy = ApiError::Status {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(busy.to_string(), "HTTP 503: busy");
    }

    #[test]
    fn bad_json_converts_to_decode() {
        let err: ApiError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_matches!(err, ApiError::Decode(_));
        assert!(err.to_string().starts_with("decode error"));
    }
}
