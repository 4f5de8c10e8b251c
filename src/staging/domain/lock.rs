//! Claim lock tokens.

use super::StagingDomainError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lock expiry stamped on a record by a claim.
///
/// The expiry doubles as proof of ownership. A record is only re-claimed
/// once its lock has expired, and the new lock always ends later, so a
/// claimant whose lock was taken over no longer holds a matching token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(DateTime<Utc>);

impl LockToken {
    /// Computes the token for a claim made at `now` lasting `lock_duration`.
    ///
    /// # Errors
    ///
    /// Returns [`StagingDomainError::InvalidLockDuration`] when the duration
    /// is not positive or the expiry is out of range.
    pub fn for_claim(
        now: DateTime<Utc>,
        lock_duration: TimeDelta,
    ) -> Result<Self, StagingDomainError> {
        if lock_duration <= TimeDelta::zero() {
            return Err(StagingDomainError::InvalidLockDuration(lock_duration));
        }
        now.checked_add_signed(lock_duration)
            .map(Self)
            .ok_or(StagingDomainError::InvalidLockDuration(lock_duration))
    }

    /// Rebuilds a token from a stored lock expiry.
    #[must_use]
    pub const fn from_expiry(expires_at: DateTime<Utc>) -> Self {
        Self(expires_at)
    }

    /// Returns the lock expiry.
    #[must_use]
    pub const fn expires_at(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
