//! Read-only status counts for dashboards.

use crate::connector::domain::ConnectorName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Live counts of staged records and failing subscriptions for an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingCounts {
    /// Records waiting to be claimed.
    pub pending: u64,
    /// Records currently locked by a claimant.
    pub in_progress: u64,
    /// Records parked in dead-letter.
    pub dead_letter: u64,
    /// Subscriptions in `Error` status, keyed by subscriber.
    pub subscriber_errors: BTreeMap<ConnectorName, u64>,
}

impl StagingCounts {
    /// Returns the total number of staged records.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending
            .saturating_add(self.in_progress)
            .saturating_add(self.dead_letter)
    }
}
