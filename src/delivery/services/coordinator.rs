//! Moves records from sources into the Box and from the Box to
//! destinations.
//!
//! A record's life: staged, subscribed, delivered to each subscriber, then
//! deleted once every subscription is processed. A record whose failures
//! exceed its retry limit, or whose destination reports a non-retryable
//! failure, is parked in dead-letter instead.

use crate::connector::{
    domain::{ConnectorName, FieldDescriptor, InterfaceName, RawBatch},
    ports::{Connector, ConnectorError, WriteError},
};
use crate::delivery::domain::{DeliveryReport, DeliverySettings, StageReport};
use crate::registry::{
    domain::{ConnectorInstance, ConnectorRole},
    ports::{InstanceRegistry, RegistryError},
};
use crate::staging::{
    domain::{LockToken, NewStagedRecord, RecordId, StageOutcome, StagedRecord},
    ports::{ClaimRequest, StagingStore, StagingStoreError, SubscriptionError, SubscriptionTracker},
    services::debatch,
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Service-level errors that abort a delivery cycle.
///
/// Connector write failures never surface here; they are recorded on the
/// subscription instead.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The instance registry could not be read.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The staging store failed or refused an operation.
    #[error(transparent)]
    Staging(#[from] StagingStoreError),
    /// The subscription tracker failed or refused an operation.
    #[error(transparent)]
    Subscriptions(#[from] SubscriptionError),
    /// A connector could not read or describe its data.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    /// The instance is registered with a different role.
    #[error("connector instance {instance} is not a {expected}")]
    RoleMismatch {
        /// Instance passed to the operation.
        instance: ConnectorName,
        /// Role the operation requires.
        expected: ConnectorRole,
    },
}

impl DeliveryError {
    /// Returns `true` when the error means the record or its subscription
    /// no longer exists.
    #[must_use]
    pub const fn is_record_gone(&self) -> bool {
        matches!(
            self,
            Self::Staging(StagingStoreError::NotFound(_))
                | Self::Subscriptions(
                    SubscriptionError::NotFound { .. } | SubscriptionError::RecordNotFound(_)
                )
        )
    }
}

/// Result type for delivery coordinator operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Orchestrates staging on the source side and delivery on the
/// destination side.
#[derive(Clone)]
pub struct DeliveryCoordinator<S, T, R, C>
where
    S: StagingStore,
    T: SubscriptionTracker,
    R: InstanceRegistry,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    tracker: Arc<T>,
    registry: Arc<R>,
    clock: Arc<C>,
    settings: DeliverySettings,
}

impl<S, T, R, C> DeliveryCoordinator<S, T, R, C>
where
    S: StagingStore,
    T: SubscriptionTracker,
    R: InstanceRegistry,
    C: Clock + Send + Sync,
{
    /// Creates a coordinator over the given ports.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        tracker: Arc<T>,
        registry: Arc<R>,
        clock: Arc<C>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            store,
            tracker,
            registry,
            clock,
            settings,
        }
    }

    /// Returns the settings the coordinator applies.
    #[must_use]
    pub const fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Stages every row of a batch read by `source` and subscribes the
    /// interface's enabled destinations to each new record.
    ///
    /// The destinations are looked up once, before anything is staged. A
    /// payload matching an active record is skipped, but its snapshot is
    /// still written if an earlier run stopped between staging and
    /// subscribing. Cancellation is honoured between payloads; the caller
    /// should then keep its poll state so the rest of the batch is read
    /// again.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Registry`] without staging anything when
    /// the registry is unavailable, and store or tracker errors as they
    /// occur.
    pub async fn stage_batch(
        &self,
        source: &ConnectorInstance,
        batch: RawBatch,
        cancel: &CancellationToken,
    ) -> DeliveryResult<StageReport> {
        ensure_role(source, ConnectorRole::Source)?;
        let interface = source.interface_name();
        let subscribers = self.enabled_subscribers(interface).await?;

        let mut report = StageReport::default();
        for payload in debatch(interface, source.instance_name(), batch) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let record = StagedRecord::new(
                NewStagedRecord {
                    interface_name: interface.clone(),
                    source_connector_name: source.instance_name().clone(),
                    source_connector_kind: source.connector_kind().clone(),
                    payload,
                    max_retries: self.settings.max_retries,
                },
                &*self.clock,
            );
            let outcome = self.store.stage(&record).await?;
            let created = self.subscribe(outcome, interface, &subscribers).await?;

            match outcome {
                StageOutcome::Staged(record_id) => {
                    report.staged += 1;
                    if subscribers.is_empty() {
                        report.orphaned += 1;
                        warn!(
                            interface = %interface,
                            record_id = %record_id,
                            "record staged with no enabled destination"
                        );
                    }
                }
                StageOutcome::Duplicate(record_id) => {
                    report.duplicates += 1;
                    debug!(
                        interface = %interface,
                        record_id = %record_id,
                        repaired = created > 0,
                        "duplicate content already staged"
                    );
                }
            }
        }

        info!(
            interface = %interface,
            source = %source.instance_name(),
            staged = report.staged,
            duplicates = report.duplicates,
            orphaned = report.orphaned,
            cancelled = report.cancelled,
            "staged batch"
        );
        Ok(report)
    }

    /// Writes the missing subscription snapshot of records staged on
    /// `interface` whose run stopped before subscribing them.
    ///
    /// Returns the number of records repaired.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the store, tracker or registry fails.
    pub async fn repair_unsubscribed(
        &self,
        interface: &InterfaceName,
        limit: usize,
    ) -> DeliveryResult<usize> {
        let stranded = self.store.find_unsubscribed(interface, limit).await?;
        if stranded.is_empty() {
            return Ok(0);
        }

        let subscribers = self.enabled_subscribers(interface).await?;
        for record in &stranded {
            let created = self
                .tracker
                .create_subscriptions(record.id(), interface, &subscribers, self.clock.utc())
                .await?;
            debug!(
                interface = %interface,
                record_id = %record.id(),
                created,
                "repaired missing subscriptions"
            );
        }

        info!(
            interface = %interface,
            repaired = stranded.len(),
            "repaired unsubscribed records"
        );
        Ok(stranded.len())
    }

    /// Claims a batch for `destination`, writes each record through
    /// `connector` and records the outcome.
    ///
    /// Records are processed oldest first. Cancellation is honoured between
    /// records; claimed records not yet written are released. Lock releases
    /// and dead-lettering only apply while this cycle still holds the lock.
    /// An outcome that arrives after the lock expired and another claimant
    /// took over or finished the record is dropped and counted as
    /// superseded.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the store or tracker fails, including
    /// a rejected delete or an unusable lock duration. Connector write
    /// failures are recorded on the subscription and counted in the report.
    pub async fn deliver_batch(
        &self,
        destination: &ConnectorInstance,
        connector: &dyn Connector,
        cancel: &CancellationToken,
    ) -> DeliveryResult<DeliveryReport> {
        ensure_role(destination, ConnectorRole::Destination)?;
        let subscriber = destination.instance_name();
        let request = ClaimRequest {
            interface_name: destination.interface_name().clone(),
            subscriber: subscriber.clone(),
            limit: self.settings.batch_size,
            lock_duration: self.settings.lock_duration,
            now: self.clock.utc(),
        };
        let token = request.lock_token()?;
        let claimed = self.store.claim_batch(&request).await?;

        let mut report = DeliveryReport {
            claimed: claimed.len(),
            ..DeliveryReport::default()
        };
        let mut queue = claimed.into_iter();
        while let Some(record) = queue.next() {
            if cancel.is_cancelled() {
                for untouched in std::iter::once(record).chain(queue.by_ref()) {
                    match self.store.release_lock(untouched.id(), token).await {
                        Ok(true) => report.released_unprocessed += 1,
                        Ok(false) | Err(StagingStoreError::NotFound(_)) => {
                            lost_lock(untouched.id(), subscriber, &mut report);
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                break;
            }
            self.deliver_record(&record, token, subscriber, connector, &mut report)
                .await?;
        }

        info!(
            interface = %destination.interface_name(),
            subscriber = %subscriber,
            claimed = report.claimed,
            delivered = report.delivered,
            deleted = report.deleted,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            released_unprocessed = report.released_unprocessed,
            superseded = report.superseded,
            "delivery cycle finished"
        );
        Ok(report)
    }

    /// Returns a dead-lettered record to delivery with a fresh retry
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Staging`] when the record is missing, is
    /// not dead-lettered, or conflicts with an active copy.
    pub async fn requeue_dead_letter(&self, record_id: RecordId) -> DeliveryResult<()> {
        self.store
            .requeue_dead_letter(record_id, self.clock.utc())
            .await?;
        info!(record_id = %record_id, "requeued dead-lettered record");
        Ok(())
    }

    async fn deliver_record(
        &self,
        record: &StagedRecord,
        token: LockToken,
        subscriber: &ConnectorName,
        connector: &dyn Connector,
        report: &mut DeliveryReport,
    ) -> DeliveryResult<()> {
        let recorded = match connector.write(record.payload()).await {
            Ok(()) => self.record_success(record, token, subscriber, report).await,
            Err(failure) => {
                report.failed += 1;
                self.record_failure(record, token, subscriber, &failure, report)
                    .await
            }
        };
        match recorded {
            Err(err) if err.is_record_gone() => {
                report.superseded += 1;
                debug!(
                    record_id = %record.id(),
                    subscriber = %subscriber,
                    "record finished by another claimant; outcome dropped"
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn record_success(
        &self,
        record: &StagedRecord,
        token: LockToken,
        subscriber: &ConnectorName,
        report: &mut DeliveryReport,
    ) -> DeliveryResult<()> {
        let record_id = record.id();
        self.tracker
            .mark_processed(record_id, subscriber, self.clock.utc())
            .await?;
        report.delivered += 1;

        if self.tracker.all_processed(record_id).await? {
            self.store.delete(record_id).await?;
            report.deleted += 1;
            debug!(
                record_id = %record_id,
                subscriber = %subscriber,
                "delivered to every subscriber; deleted"
            );
        } else if self.store.release_lock(record_id, token).await? {
            debug!(record_id = %record_id, subscriber = %subscriber, "delivered");
        } else {
            lost_lock(record_id, subscriber, report);
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        record: &StagedRecord,
        token: LockToken,
        subscriber: &ConnectorName,
        failure: &WriteError,
        report: &mut DeliveryReport,
    ) -> DeliveryResult<()> {
        let record_id = record.id();
        let now = self.clock.utc();
        let recorded = self
            .tracker
            .mark_error(record_id, subscriber, failure.message(), now)
            .await?;
        if !recorded {
            // A later claimant already delivered this subscriber's copy.
            self.store.release_lock(record_id, token).await?;
            report.superseded += 1;
            debug!(
                record_id = %record_id,
                subscriber = %subscriber,
                "failure arrived after a successful delivery; ignored"
            );
            return Ok(());
        }

        let retries = self.store.increment_retry(record_id, now).await?;
        if !failure.is_retryable() || retries > record.max_retries() {
            if self.store.mark_dead_letter(record_id, token).await? {
                report.dead_lettered += 1;
                warn!(
                    record_id = %record_id,
                    subscriber = %subscriber,
                    retries,
                    retryable = failure.is_retryable(),
                    error = failure.message(),
                    "record moved to dead-letter"
                );
            } else {
                lost_lock(record_id, subscriber, report);
            }
        } else if self.store.release_lock(record_id, token).await? {
            warn!(
                record_id = %record_id,
                subscriber = %subscriber,
                retries,
                error = failure.message(),
                "delivery failed; record will be retried"
            );
        } else {
            lost_lock(record_id, subscriber, report);
        }
        Ok(())
    }

    async fn enabled_subscribers(
        &self,
        interface: &InterfaceName,
    ) -> DeliveryResult<Vec<ConnectorName>> {
        let destinations = self.registry.list_enabled_destinations(interface).await?;
        Ok(destinations
            .iter()
            .map(|destination| destination.instance_name().clone())
            .collect())
    }

    async fn subscribe(
        &self,
        outcome: StageOutcome,
        interface: &InterfaceName,
        subscribers: &[ConnectorName],
    ) -> DeliveryResult<usize> {
        let record_id = outcome.record_id();
        let created = self
            .tracker
            .create_subscriptions(record_id, interface, subscribers, self.clock.utc())
            .await;
        match (outcome, created) {
            (_, Ok(count)) => Ok(count),
            // The active copy was dead-lettered or deleted after the insert
            // conflicted; nothing is left to subscribe.
            (StageOutcome::Duplicate(_), Err(SubscriptionError::RecordNotFound(_))) => {
                debug!(record_id = %record_id, "duplicate vanished before subscribing");
                Ok(0)
            }
            (_, Err(err)) => Err(err.into()),
        }
    }
}

/// Prepares `destination` for the schema `source` describes.
///
/// Run once before a destination loop starts. Returns the schema applied.
///
/// # Errors
///
/// Returns [`DeliveryError::Connector`] when either connector fails.
pub async fn prepare_destination(
    source: &dyn Connector,
    destination: &dyn Connector,
) -> DeliveryResult<Vec<FieldDescriptor>> {
    let fields = source.describe_schema().await?;
    destination.ensure_destination_ready(&fields).await?;
    debug!(fields = fields.len(), "destination prepared");
    Ok(fields)
}

/// Notes an outcome recorded after the cycle's lock was taken over.
fn lost_lock(record_id: RecordId, subscriber: &ConnectorName, report: &mut DeliveryReport) {
    report.superseded += 1;
    debug!(
        record_id = %record_id,
        subscriber = %subscriber,
        "lock expired and was taken over; record left to its new claimant"
    );
}

fn ensure_role(instance: &ConnectorInstance, expected: ConnectorRole) -> DeliveryResult<()> {
    if instance.role() == expected {
        return Ok(());
    }
    Err(DeliveryError::RoleMismatch {
        instance: instance.instance_name().clone(),
        expected,
    })
}
