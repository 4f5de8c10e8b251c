//! Error types for connector domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing validated name values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NameError {
    /// The value is empty after trimming.
    #[error("{kind} must not be empty")]
    Empty {
        /// Which kind of name was rejected.
        kind: &'static str,
    },

    /// The value exceeds the persisted column width.
    #[error("{kind} '{value}' exceeds {max} characters")]
    TooLong {
        /// Which kind of name was rejected.
        kind: &'static str,
        /// The rejected value.
        value: String,
        /// Maximum accepted length.
        max: usize,
    },
}

/// Error returned while parsing field types from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown field type: {0}")]
pub struct ParseFieldTypeError(pub String);
