//! Thread-safe in-memory Box implementing both staging ports.
//!
//! Every operation runs under one write lock, which gives the same
//! atomicity the `PostgreSQL` adapter gets from single statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::connector::domain::{ConnectorName, InterfaceName};
use crate::staging::{
    domain::{
        ContentHash, LockToken, RecordId, RecordStatus, StageOutcome, StagedRecord,
        StagingCounts, Subscription, SubscriptionStatus,
    },
    ports::{
        ClaimRequest, StagingResult, StagingStore, StagingStoreError, SubscriptionError,
        SubscriptionResult, SubscriptionTracker,
    },
};

/// Thread-safe in-memory staging store and subscription tracker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStagingBox {
    state: Arc<RwLock<InMemoryBoxState>>,
}

#[derive(Debug, Default)]
struct InMemoryBoxState {
    records: HashMap<RecordId, StagedRecord>,
    subscriptions: HashMap<RecordId, Vec<Subscription>>,
    active_hashes: HashMap<(InterfaceName, ContentHash), RecordId>,
}

impl InMemoryBoxState {
    fn record_mut(&mut self, id: RecordId) -> StagingResult<&mut StagedRecord> {
        self.records
            .get_mut(&id)
            .ok_or(StagingStoreError::NotFound(id))
    }

    fn has_open_subscription(&self, id: RecordId, subscriber: &ConnectorName) -> bool {
        self.subscriptions.get(&id).is_some_and(|subscriptions| {
            subscriptions
                .iter()
                .any(|sub| sub.subscriber() == subscriber && sub.status().is_open())
        })
    }

    fn all_processed(&self, id: RecordId) -> bool {
        self.subscriptions.get(&id).is_some_and(|subscriptions| {
            !subscriptions.is_empty()
                && subscriptions
                    .iter()
                    .all(|sub| sub.status() == SubscriptionStatus::Processed)
        })
    }

    fn unindex(&mut self, record: &StagedRecord) {
        let key = (record.interface_name().clone(), record.content_hash().clone());
        if self.active_hashes.get(&key) == Some(&record.id()) {
            self.active_hashes.remove(&key);
        }
    }

    fn remove(&mut self, id: RecordId) {
        if let Some(record) = self.records.remove(&id) {
            self.unindex(&record);
        }
        self.subscriptions.remove(&id);
    }

    fn dead_letter(&mut self, id: RecordId) -> StagingResult<()> {
        let record = self.record_mut(id)?;
        record.dead_letter();
        let snapshot = record.clone();
        self.unindex(&snapshot);
        Ok(())
    }

    fn subscription_mut(
        &mut self,
        record_id: RecordId,
        subscriber: &ConnectorName,
    ) -> SubscriptionResult<&mut Subscription> {
        self.subscriptions
            .get_mut(&record_id)
            .and_then(|subscriptions| {
                subscriptions
                    .iter_mut()
                    .find(|sub| sub.subscriber() == subscriber)
            })
            .ok_or_else(|| SubscriptionError::NotFound {
                record_id,
                subscriber: subscriber.clone(),
            })
    }
}

impl InMemoryStagingBox {
    /// Creates an empty in-memory Box.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records currently held.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::Persistence`] when the state lock is
    /// poisoned.
    pub fn len(&self) -> StagingResult<usize> {
        Ok(self.read_state()?.records.len())
    }

    /// Returns `true` when no records are held.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::Persistence`] when the state lock is
    /// poisoned.
    pub fn is_empty(&self) -> StagingResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns a copy of every held record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StagingStoreError::Persistence`] when the state lock is
    /// poisoned.
    pub fn records(&self) -> StagingResult<Vec<StagedRecord>> {
        let mut records: Vec<StagedRecord> =
            self.read_state()?.records.values().cloned().collect();
        sort_oldest_first(&mut records);
        Ok(records)
    }

    fn read_state(&self) -> StagingResult<RwLockReadGuard<'_, InMemoryBoxState>> {
        self.state.read().map_err(|err| {
            StagingStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write_state(&self) -> StagingResult<RwLockWriteGuard<'_, InMemoryBoxState>> {
        self.state.write().map_err(|err| {
            StagingStoreError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn read_subscriptions(&self) -> SubscriptionResult<RwLockReadGuard<'_, InMemoryBoxState>> {
        self.state.read().map_err(|err| {
            SubscriptionError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write_subscriptions(&self) -> SubscriptionResult<RwLockWriteGuard<'_, InMemoryBoxState>> {
        self.state.write().map_err(|err| {
            SubscriptionError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

/// Sorts records oldest first with the identifier as tie-break.
fn sort_oldest_first(records: &mut [StagedRecord]) {
    records.sort_by_key(|record| (record.created_at(), record.id()));
}

#[async_trait]
impl StagingStore for InMemoryStagingBox {
    async fn stage(&self, record: &StagedRecord) -> StagingResult<StageOutcome> {
        let mut state = self.write_state()?;
        let key = (record.interface_name().clone(), record.content_hash().clone());
        if let Some(existing) = state.active_hashes.get(&key) {
            return Ok(StageOutcome::Duplicate(*existing));
        }
        if state.records.contains_key(&record.id()) {
            return Ok(StageOutcome::Duplicate(record.id()));
        }

        state.active_hashes.insert(key, record.id());
        state.records.insert(record.id(), record.clone());
        Ok(StageOutcome::Staged(record.id()))
    }

    async fn find(&self, id: RecordId) -> StagingResult<Option<StagedRecord>> {
        let state = self.read_state()?;
        Ok(state.records.get(&id).cloned())
    }

    async fn claim_batch(&self, request: &ClaimRequest) -> StagingResult<Vec<StagedRecord>> {
        let token = request.lock_token()?;
        let mut state = self.write_state()?;
        let mut candidates: Vec<StagedRecord> = state
            .records
            .values()
            .filter(|record| {
                record.interface_name() == &request.interface_name
                    && record.is_claimable_at(request.now)
                    && state.has_open_subscription(record.id(), &request.subscriber)
            })
            .cloned()
            .collect();
        sort_oldest_first(&mut candidates);
        candidates.truncate(request.limit);

        let mut claimed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let record = state.record_mut(candidate.id())?;
            record.claim(request.now, token)?;
            claimed.push(record.clone());
        }
        Ok(claimed)
    }

    async fn release_lock(&self, id: RecordId, token: LockToken) -> StagingResult<bool> {
        let mut state = self.write_state()?;
        let record = state.record_mut(id)?;
        if !record.holds_lock(token) {
            return Ok(false);
        }
        record.release_lock();
        Ok(true)
    }

    async fn increment_retry(&self, id: RecordId, now: DateTime<Utc>) -> StagingResult<u32> {
        let mut state = self.write_state()?;
        Ok(state.record_mut(id)?.record_retry(now))
    }

    async fn mark_dead_letter(&self, id: RecordId, token: LockToken) -> StagingResult<bool> {
        let mut state = self.write_state()?;
        if !state.record_mut(id)?.holds_lock(token) {
            return Ok(false);
        }
        state.dead_letter(id)?;
        Ok(true)
    }

    async fn delete(&self, id: RecordId) -> StagingResult<()> {
        let mut state = self.write_state()?;
        if !state.records.contains_key(&id) {
            return Err(StagingStoreError::NotFound(id));
        }
        if !state.all_processed(id) {
            return Err(StagingStoreError::DeleteRejected {
                record_id: id,
                reason: "not every subscription is processed",
            });
        }
        state.remove(id);
        Ok(())
    }

    async fn release_stale_locks(&self, now: DateTime<Utc>) -> StagingResult<u64> {
        let mut state = self.write_state()?;
        let mut released = 0_u64;
        for record in state.records.values_mut() {
            let expired = record.in_progress_until().is_some_and(|until| until < now);
            if record.status() == RecordStatus::InProgress && expired {
                record.release_lock();
                released = released.saturating_add(1);
            }
        }
        Ok(released)
    }

    async fn promote_exhausted(&self) -> StagingResult<u64> {
        let mut state = self.write_state()?;
        let exhausted: Vec<RecordId> = state
            .records
            .values()
            .filter(|record| {
                record.status() != RecordStatus::DeadLetter && record.retries_exhausted()
            })
            .map(StagedRecord::id)
            .collect();
        for id in &exhausted {
            state.dead_letter(*id)?;
        }
        Ok(exhausted.len() as u64)
    }

    async fn find_unsubscribed(
        &self,
        interface_name: &InterfaceName,
        limit: usize,
    ) -> StagingResult<Vec<StagedRecord>> {
        let state = self.read_state()?;
        let mut records: Vec<StagedRecord> = state
            .records
            .values()
            .filter(|record| {
                record.interface_name() == interface_name && record.subscribed_at().is_none()
            })
            .cloned()
            .collect();
        sort_oldest_first(&mut records);
        records.truncate(limit);
        Ok(records)
    }

    async fn purge_orphans(&self, older_than: DateTime<Utc>) -> StagingResult<u64> {
        let mut state = self.write_state()?;
        let orphans: Vec<RecordId> = state
            .records
            .values()
            .filter(|record| {
                record.subscribed_at().is_some()
                    && record.created_at() < older_than
                    && state
                        .subscriptions
                        .get(&record.id())
                        .is_none_or(Vec::is_empty)
            })
            .map(StagedRecord::id)
            .collect();
        for id in &orphans {
            state.remove(*id);
        }
        Ok(orphans.len() as u64)
    }

    async fn requeue_dead_letter(&self, id: RecordId, now: DateTime<Utc>) -> StagingResult<()> {
        let mut state = self.write_state()?;
        let current = state
            .records
            .get(&id)
            .cloned()
            .ok_or(StagingStoreError::NotFound(id))?;
        let key = (
            current.interface_name().clone(),
            current.content_hash().clone(),
        );
        if current.status() == RecordStatus::DeadLetter && state.active_hashes.contains_key(&key)
        {
            return Err(StagingStoreError::Conflict(id));
        }

        state.record_mut(id)?.requeue()?;
        state.active_hashes.insert(key, id);
        if let Some(subscriptions) = state.subscriptions.get_mut(&id) {
            for subscription in subscriptions {
                subscription.reset_error(now);
            }
        }
        Ok(())
    }

    async fn status_counts(&self, interface_name: &InterfaceName) -> StagingResult<StagingCounts> {
        let state = self.read_state()?;
        let mut counts = StagingCounts::default();
        for record in state
            .records
            .values()
            .filter(|record| record.interface_name() == interface_name)
        {
            let slot = match record.status() {
                RecordStatus::Pending => &mut counts.pending,
                RecordStatus::InProgress => &mut counts.in_progress,
                RecordStatus::DeadLetter => &mut counts.dead_letter,
            };
            *slot = slot.saturating_add(1);
        }

        let mut errors: BTreeMap<ConnectorName, u64> = BTreeMap::new();
        for subscription in state
            .subscriptions
            .values()
            .flatten()
            .filter(|sub| {
                sub.interface_name() == interface_name
                    && sub.status() == SubscriptionStatus::Error
            })
        {
            let slot = errors.entry(subscription.subscriber().clone()).or_default();
            *slot = slot.saturating_add(1);
        }
        counts.subscriber_errors = errors;
        Ok(counts)
    }
}

#[async_trait]
impl SubscriptionTracker for InMemoryStagingBox {
    async fn create_subscriptions(
        &self,
        record_id: RecordId,
        interface_name: &InterfaceName,
        subscribers: &[ConnectorName],
        now: DateTime<Utc>,
    ) -> SubscriptionResult<usize> {
        let mut state = self.write_subscriptions()?;
        let record = state
            .records
            .get_mut(&record_id)
            .ok_or(SubscriptionError::RecordNotFound(record_id))?;
        if record.subscribed_at().is_some() {
            return Ok(0);
        }
        record.mark_subscribed(now);

        let mut created: Vec<Subscription> = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            if created.iter().any(|sub| sub.subscriber() == subscriber) {
                continue;
            }
            created.push(Subscription::new(
                record_id,
                interface_name.clone(),
                subscriber.clone(),
                now,
            ));
        }
        let count = created.len();
        state.subscriptions.insert(record_id, created);
        Ok(count)
    }

    async fn mark_processed(
        &self,
        record_id: RecordId,
        subscriber: &ConnectorName,
        now: DateTime<Utc>,
    ) -> SubscriptionResult<()> {
        let mut state = self.write_subscriptions()?;
        state.subscription_mut(record_id, subscriber)?.mark_processed(now);
        Ok(())
    }

    async fn mark_error(
        &self,
        record_id: RecordId,
        subscriber: &ConnectorName,
        message: &str,
        now: DateTime<Utc>,
    ) -> SubscriptionResult<bool> {
        let mut state = self.write_subscriptions()?;
        Ok(state
            .subscription_mut(record_id, subscriber)?
            .mark_error(message, now))
    }

    async fn all_processed(&self, record_id: RecordId) -> SubscriptionResult<bool> {
        let state = self.read_subscriptions()?;
        Ok(state.all_processed(record_id))
    }

    async fn list_for_record(&self, record_id: RecordId) -> SubscriptionResult<Vec<Subscription>> {
        let state = self.read_subscriptions()?;
        let mut subscriptions = state
            .subscriptions
            .get(&record_id)
            .cloned()
            .unwrap_or_default();
        subscriptions.sort_by(|a, b| a.subscriber().cmp(b.subscriber()));
        Ok(subscriptions)
    }
}
