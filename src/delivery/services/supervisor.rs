//! Periodic recovery of stale locks and exhausted records.

use crate::delivery::domain::SweepReport;
use crate::staging::ports::{StagingStore, StagingStoreError};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a supervisor sweep.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The staging store failed.
    #[error(transparent)]
    Staging(#[from] StagingStoreError),
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Releases locks left behind by crashed claimants and dead-letters
/// records that exhausted their retries.
///
/// With an orphan TTL it also purges records that were staged while their
/// interface had no enabled destination.
#[derive(Clone)]
pub struct LockRetrySupervisor<S>
where
    S: StagingStore,
{
    store: Arc<S>,
    orphan_ttl: Option<TimeDelta>,
}

impl<S> LockRetrySupervisor<S>
where
    S: StagingStore,
{
    /// Creates a supervisor that never purges orphans.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self {
            store,
            orphan_ttl: None,
        }
    }

    /// Purges zero-subscriber records older than `ttl` on every sweep.
    #[must_use]
    pub const fn with_orphan_ttl(mut self, ttl: Option<TimeDelta>) -> Self {
        self.orphan_ttl = ttl;
        self
    }

    /// Runs one sweep as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Staging`] when any store update fails.
    /// Updates applied before the failure stay applied.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SupervisorResult<SweepReport> {
        let released_locks = self.store.release_stale_locks(now).await?;
        let dead_lettered = self.store.promote_exhausted().await?;
        let purged_orphans = match self
            .orphan_ttl
            .and_then(|ttl| now.checked_sub_signed(ttl))
        {
            Some(cutoff) => self.store.purge_orphans(cutoff).await?,
            None => 0,
        };

        let report = SweepReport {
            released_locks,
            dead_lettered,
            purged_orphans,
        };
        if report.is_idle() {
            debug!("sweep found nothing to recover");
        } else {
            if dead_lettered > 0 {
                warn!(dead_lettered, "records exhausted their retries");
            }
            info!(
                released_locks,
                dead_lettered, purged_orphans, "sweep recovered records"
            );
        }
        Ok(report)
    }
}
