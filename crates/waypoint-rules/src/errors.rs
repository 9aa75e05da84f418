//! Rule compilation errors.
//!
//! None of these are fatal: the index drops the offending condition and
//! builds from the rest.

use thiserror::Error;

/// Why a raw condition could not be compiled.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The operator name is not recognised.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// The field/operator pair has no client-side meaning.
    #[error("unsupported condition: {field} {op}")]
    Unsupported {
        /// Dotted field path.
        field: String,
        /// Operator name.
        op: String,
    },

    /// The operand has the wrong shape for the operator.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field path.
        field: String,
        /// What was wrong.
        reason: String,
    },

    /// A `regex` operand failed to compile.
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),
}

/// Result type for rule compilation.
pub type Result<T> = std::result::Result<T, RuleError>;
