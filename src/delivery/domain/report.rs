//! Per-cycle outcome summaries.

use serde::{Deserialize, Serialize};

/// Outcome of staging one source batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Payloads inserted as new records.
    pub staged: usize,
    /// Payloads matching an active record.
    pub duplicates: usize,
    /// New records staged while the interface had no enabled destination.
    pub orphaned: usize,
    /// The batch was cut short by cancellation.
    pub cancelled: bool,
}

/// Outcome of one destination delivery cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Records claimed for the destination.
    pub claimed: usize,
    /// Records written successfully.
    pub delivered: usize,
    /// Records deleted because every subscriber has processed them.
    pub deleted: usize,
    /// Records whose write failed.
    pub failed: usize,
    /// Failed records moved to dead-letter.
    pub dead_lettered: usize,
    /// Claimed records released untouched after cancellation.
    pub released_unprocessed: usize,
    /// Outcomes dropped because the lock expired and another claimant took
    /// the record over or finished it first.
    pub superseded: usize,
}

/// Outcome of one supervisor sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Expired locks returned to pending.
    pub released_locks: u64,
    /// Records promoted to dead-letter.
    pub dead_lettered: u64,
    /// Zero-subscriber records purged after their TTL.
    pub purged_orphans: u64,
}

impl SweepReport {
    /// Returns `true` when the sweep changed nothing.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.released_locks == 0 && self.dead_lettered == 0 && self.purged_orphans == 0
    }
}
