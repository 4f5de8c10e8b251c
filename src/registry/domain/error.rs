//! Error types for registry domain parsing.

use thiserror::Error;

/// Errors returned while reconstructing registry entries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryDomainError {
    /// The persisted role is not `source` or `destination`.
    #[error("unknown connector role: {0}")]
    UnknownRole(String),
}
