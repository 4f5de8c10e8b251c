//! Error types for staging domain validation and parsing.

use super::{RecordId, RecordStatus};
use chrono::TimeDelta;
use thiserror::Error;

/// Errors returned by record state transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StagingDomainError {
    /// The transition is not allowed from the record's current status.
    #[error("record {record_id} cannot {action} while {status}")]
    InvalidTransition {
        /// Record the transition was attempted on.
        record_id: RecordId,
        /// Current record status.
        status: RecordStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// A claim asked for a lock that is not positive or ends out of range.
    #[error("invalid lock duration {0}: expected a positive duration within range")]
    InvalidLockDuration(TimeDelta),
}

/// Error returned while parsing record or subscription statuses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(pub String);
