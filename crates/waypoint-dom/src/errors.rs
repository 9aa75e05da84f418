//! DOM error types.

use thiserror::Error;

use crate::document::NodeId;

/// Errors raised by [`Document`](crate::Document) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The selector did not parse.
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector {
        /// Selector as given.
        selector: String,
        /// Parser message.
        reason: String,
    },
    /// The handle does not refer to a live element.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// The element cannot hold a value.
    #[error("node {0} is not a form control")]
    NotFormControl(NodeId),
    /// The host refused the navigation.
    #[error("navigation to {0} failed")]
    Navigation(String),
}

/// Result type for DOM operations.
pub type Result<T> = std::result::Result<T, DomError>;
