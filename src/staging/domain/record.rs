//! Staged record aggregate root.

use super::{ContentHash, LockToken, RecordId, RecordStatus, StagingDomainError};
use crate::connector::domain::{ConnectorKind, ConnectorName, InterfaceName, Payload};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Outcome of staging a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The record was inserted.
    Staged(RecordId),
    /// An active record with the same content hash already exists; nothing
    /// was inserted.
    Duplicate(RecordId),
}

impl StageOutcome {
    /// Returns the identifier of the record now holding the content.
    #[must_use]
    pub const fn record_id(self) -> RecordId {
        match self {
            Self::Staged(id) | Self::Duplicate(id) => id,
        }
    }
}

/// Parameter object describing a record produced by a source connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStagedRecord {
    /// Route the record travels on.
    pub interface_name: InterfaceName,
    /// Source instance that produced the record.
    pub source_connector_name: ConnectorName,
    /// Connector type of the source instance.
    pub source_connector_kind: ConnectorKind,
    /// Record content.
    pub payload: Payload,
    /// Failed deliveries tolerated before dead-lettering.
    pub max_retries: u32,
}

/// A record held in the Box until every subscriber has processed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRecord {
    id: RecordId,
    interface_name: InterfaceName,
    source_connector_name: ConnectorName,
    source_connector_kind: ConnectorKind,
    payload: Payload,
    content_hash: ContentHash,
    status: RecordStatus,
    retry_count: u32,
    max_retries: u32,
    in_progress_until: Option<DateTime<Utc>>,
    last_retry_time: Option<DateTime<Utc>>,
    subscribed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecordData {
    /// Persisted record identifier.
    pub id: RecordId,
    /// Persisted interface name.
    pub interface_name: InterfaceName,
    /// Persisted source instance name.
    pub source_connector_name: ConnectorName,
    /// Persisted source connector type.
    pub source_connector_kind: ConnectorKind,
    /// Persisted payload.
    pub payload: Payload,
    /// Persisted content hash.
    pub content_hash: ContentHash,
    /// Persisted status.
    pub status: RecordStatus,
    /// Persisted retry count.
    pub retry_count: u32,
    /// Persisted retry limit.
    pub max_retries: u32,
    /// Persisted lock expiry.
    pub in_progress_until: Option<DateTime<Utc>>,
    /// Persisted time of the last failed attempt.
    pub last_retry_time: Option<DateTime<Utc>>,
    /// Persisted time the subscription snapshot was written.
    pub subscribed_at: Option<DateTime<Utc>>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl StagedRecord {
    /// Creates a pending record and computes its content hash.
    #[must_use]
    pub fn new(new_record: NewStagedRecord, clock: &impl Clock) -> Self {
        let NewStagedRecord {
            interface_name,
            source_connector_name,
            source_connector_kind,
            payload,
            max_retries,
        } = new_record;
        let content_hash = ContentHash::compute(&interface_name, &payload);

        Self {
            id: RecordId::new(),
            interface_name,
            source_connector_name,
            source_connector_kind,
            payload,
            content_hash,
            status: RecordStatus::Pending,
            retry_count: 0,
            max_retries,
            in_progress_until: None,
            last_retry_time: None,
            subscribed_at: None,
            created_at: clock.utc(),
        }
    }

    /// Reconstructs a record from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedRecordData) -> Self {
        Self {
            id: data.id,
            interface_name: data.interface_name,
            source_connector_name: data.source_connector_name,
            source_connector_kind: data.source_connector_kind,
            payload: data.payload,
            content_hash: data.content_hash,
            status: data.status,
            retry_count: data.retry_count,
            max_retries: data.max_retries,
            in_progress_until: data.in_progress_until,
            last_retry_time: data.last_retry_time,
            subscribed_at: data.subscribed_at,
            created_at: data.created_at,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the interface name.
    #[must_use]
    pub const fn interface_name(&self) -> &InterfaceName {
        &self.interface_name
    }

    /// Returns the source instance name.
    #[must_use]
    pub const fn source_connector_name(&self) -> &ConnectorName {
        &self.source_connector_name
    }

    /// Returns the source connector type.
    #[must_use]
    pub const fn source_connector_kind(&self) -> &ConnectorKind {
        &self.source_connector_kind
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the content hash.
    #[must_use]
    pub const fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Returns the record status.
    #[must_use]
    pub const fn status(&self) -> RecordStatus {
        self.status
    }

    /// Returns the number of failed delivery attempts.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the retry limit.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the lock expiry, if locked.
    #[must_use]
    pub const fn in_progress_until(&self) -> Option<DateTime<Utc>> {
        self.in_progress_until
    }

    /// Returns the time of the last failed attempt.
    #[must_use]
    pub const fn last_retry_time(&self) -> Option<DateTime<Utc>> {
        self.last_retry_time
    }

    /// Returns when the subscription snapshot was written, if it was.
    #[must_use]
    pub const fn subscribed_at(&self) -> Option<DateTime<Utc>> {
        self.subscribed_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns `true` when a claimant holds an unexpired lock at `now`.
    #[must_use]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.in_progress_until.is_some_and(|until| until >= now)
    }

    /// Returns `true` once the retry count exceeds the retry limit.
    #[must_use]
    pub const fn retries_exhausted(&self) -> bool {
        self.retry_count > self.max_retries
    }

    /// Returns `true` when the record may be claimed at `now`.
    #[must_use]
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        self.status != RecordStatus::DeadLetter && !self.is_locked_at(now)
    }

    /// Returns the token of the current lock, if locked.
    #[must_use]
    pub fn lock_token(&self) -> Option<LockToken> {
        self.in_progress_until.map(LockToken::from_expiry)
    }

    /// Returns `true` when `token` is the record's current lock.
    #[must_use]
    pub fn holds_lock(&self, token: LockToken) -> bool {
        self.in_progress_until == Some(token.expires_at())
    }

    /// Locks the record at `now` until the expiry carried by `token`.
    ///
    /// # Errors
    ///
    /// Returns [`StagingDomainError::InvalidTransition`] when the record is
    /// dead-lettered or still locked.
    pub fn claim(
        &mut self,
        now: DateTime<Utc>,
        token: LockToken,
    ) -> Result<(), StagingDomainError> {
        if !self.is_claimable_at(now) {
            return Err(self.invalid("be claimed"));
        }
        self.status = RecordStatus::InProgress;
        self.in_progress_until = Some(token.expires_at());
        Ok(())
    }

    /// Clears the lock. A dead-lettered record keeps its status.
    pub fn release_lock(&mut self) {
        self.in_progress_until = None;
        if self.status == RecordStatus::InProgress {
            self.status = RecordStatus::Pending;
        }
    }

    /// Counts a failed attempt and returns the new retry count.
    pub fn record_retry(&mut self, now: DateTime<Utc>) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_retry_time = Some(now);
        self.retry_count
    }

    /// Parks the record in dead-letter and clears its lock.
    pub fn dead_letter(&mut self) {
        self.status = RecordStatus::DeadLetter;
        self.in_progress_until = None;
    }

    /// Marks the subscription snapshot as written.
    pub fn mark_subscribed(&mut self, now: DateTime<Utc>) {
        self.subscribed_at = Some(now);
    }

    /// Returns a dead-lettered record to the pending pool with a fresh retry
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns [`StagingDomainError::InvalidTransition`] when the record is
    /// not dead-lettered.
    pub fn requeue(&mut self) -> Result<(), StagingDomainError> {
        if self.status != RecordStatus::DeadLetter {
            return Err(self.invalid("be requeued"));
        }
        self.status = RecordStatus::Pending;
        self.retry_count = 0;
        self.in_progress_until = None;
        Ok(())
    }

    const fn invalid(&self, action: &'static str) -> StagingDomainError {
        StagingDomainError::InvalidTransition {
            record_id: self.id,
            status: self.status,
            action,
        }
    }
}
