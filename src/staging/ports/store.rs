//! Repository port for staged records.

use crate::connector::domain::{ConnectorName, InterfaceName};
use crate::staging::domain::{
    LockToken, RecordId, StageOutcome, StagedRecord, StagingCounts, StagingDomainError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for staging store operations.
pub type StagingResult<T> = Result<T, StagingStoreError>;

/// Parameters of an atomic lock-and-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    /// Interface to claim from.
    pub interface_name: InterfaceName,
    /// Subscriber that must have an open subscription on each record.
    pub subscriber: ConnectorName,
    /// Maximum number of records to return.
    pub limit: usize,
    /// How long the claim locks each record.
    pub lock_duration: Duration,
    /// Current time according to the caller's clock.
    pub now: DateTime<Utc>,
}

impl ClaimRequest {
    /// Returns the token every record claimed by this request is locked
    /// with.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::Domain`] when the lock duration is not
    /// positive or the expiry is out of range.
    pub fn lock_token(&self) -> StagingResult<LockToken> {
        Ok(LockToken::for_claim(self.now, self.lock_duration)?)
    }
}

/// Staged record persistence contract.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Inserts a record unless an active record with the same content hash
    /// exists on the same interface.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::Persistence`] when the insert fails for
    /// any reason other than the idempotency check.
    async fn stage(&self, record: &StagedRecord) -> StagingResult<StageOutcome>;

    /// Finds a record by identifier.
    ///
    /// Returns `None` when the record does not exist.
    async fn find(&self, id: RecordId) -> StagingResult<Option<StagedRecord>>;

    /// Atomically locks and returns up to `limit` claimable records, oldest
    /// first, each locked with [`ClaimRequest::lock_token`].
    ///
    /// A record is claimable when it is not dead-lettered, is unlocked or
    /// its lock expired, and has a subscription for the subscriber that is
    /// not yet processed. Concurrent callers never receive the same record.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::Domain`] when the request's lock
    /// duration is unusable; nothing is claimed in that case.
    async fn claim_batch(&self, request: &ClaimRequest) -> StagingResult<Vec<StagedRecord>>;

    /// Clears the record lock held with `token` and returns the record to
    /// pending.
    ///
    /// Returns `false` and changes nothing when the record is no longer
    /// locked with `token`, because the lock expired and was released or
    /// taken over.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::NotFound`] when the record does not
    /// exist.
    async fn release_lock(&self, id: RecordId, token: LockToken) -> StagingResult<bool>;

    /// Atomically increments the retry count and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::NotFound`] when the record does not
    /// exist.
    async fn increment_retry(&self, id: RecordId, now: DateTime<Utc>) -> StagingResult<u32>;

    /// Moves the record locked with `token` to dead-letter and clears its
    /// lock.
    ///
    /// Returns `false` and changes nothing when the record is no longer
    /// locked with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::NotFound`] when the record does not
    /// exist.
    async fn mark_dead_letter(&self, id: RecordId, token: LockToken) -> StagingResult<bool>;

    /// Deletes the record together with its subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::DeleteRejected`] unless the record has
    /// at least one subscription and all of them are processed. Nothing is
    /// deleted in that case.
    async fn delete(&self, id: RecordId) -> StagingResult<()>;

    /// Returns expired in-progress records to pending and reports how many
    /// were released.
    async fn release_stale_locks(&self, now: DateTime<Utc>) -> StagingResult<u64>;

    /// Dead-letters every record whose retry count exceeds its limit and
    /// reports how many were promoted.
    async fn promote_exhausted(&self) -> StagingResult<u64>;

    /// Returns records on the interface whose subscription snapshot was
    /// never written, oldest first.
    async fn find_unsubscribed(
        &self,
        interface_name: &InterfaceName,
        limit: usize,
    ) -> StagingResult<Vec<StagedRecord>>;

    /// Deletes subscribed records that have no subscriptions and were
    /// created before `older_than`, reporting how many were removed.
    async fn purge_orphans(&self, older_than: DateTime<Utc>) -> StagingResult<u64>;

    /// Returns a dead-lettered record to pending with a fresh retry budget
    /// and resets its failed subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::NotFound`] when the record does not
    /// exist, [`StagingStoreError::Domain`] when it is not dead-lettered,
    /// or [`StagingStoreError::Conflict`] when another active record now
    /// holds the same content.
    async fn requeue_dead_letter(&self, id: RecordId, now: DateTime<Utc>) -> StagingResult<()>;

    /// Counts records by status and failing subscriptions by subscriber.
    async fn status_counts(&self, interface_name: &InterfaceName) -> StagingResult<StagingCounts>;
}

/// Errors returned by staging store implementations.
#[derive(Debug, Clone, Error)]
pub enum StagingStoreError {
    /// The record was not found.
    #[error("staged record not found: {0}")]
    NotFound(RecordId),

    /// Deletion was refused because delivery is incomplete.
    #[error("refusing to delete record {record_id}: {reason}")]
    DeleteRejected {
        /// Record that was kept.
        record_id: RecordId,
        /// Why deletion was refused.
        reason: &'static str,
    },

    /// Another active record holds the same content.
    #[error("record {0} conflicts with an active record holding the same content")]
    Conflict(RecordId),

    /// The requested transition is invalid for the record's status.
    #[error(transparent)]
    Domain(#[from] StagingDomainError),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StagingStoreError {
    /// Wraps a data-quality or deserialization error from persisted rows.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
