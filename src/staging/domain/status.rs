//! Record and subscription statuses.

use super::ParseStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a staged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Waiting to be claimed by a subscriber.
    Pending,
    /// Claimed and locked until `in_progress_until`.
    InProgress,
    /// Retries exhausted; kept for manual inspection and never claimed.
    DeadLetter,
}

impl RecordStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::DeadLetter => "dead_letter",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RecordStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "dead_letter" => Ok(Self::DeadLetter),
            _ => Err(ParseStatusError(value.to_owned())),
        }
    }
}

/// Delivery status of one subscriber's obligation for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Not delivered yet.
    Pending,
    /// Delivered successfully.
    Processed,
    /// The last delivery attempt failed; the subscriber retries on a later
    /// claim.
    Error,
}

impl SubscriptionStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Error => "error",
        }
    }

    /// Returns `true` while the subscriber still owes a delivery.
    #[must_use]
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Processed)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SubscriptionStatus {
    type Error = ParseStatusError;

    // The `Error` variant shadows the associated type, so it is spelled out.
    fn try_from(value: &str) -> Result<Self, ParseStatusError> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "error" => Ok(SubscriptionStatus::Error),
            _ => Err(ParseStatusError(value.to_owned())),
        }
    }
}
