//! Repository port for per-record subscriptions.

use crate::connector::domain::{ConnectorName, InterfaceName};
use crate::staging::domain::{RecordId, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for subscription tracker operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

/// Subscription persistence contract.
#[async_trait]
pub trait SubscriptionTracker: Send + Sync {
    /// Writes the subscription snapshot for a record: one pending row per
    /// subscriber, and the record's `subscribed_at` marker, atomically.
    ///
    /// Returns the number of rows created. Returns `0` without changes when
    /// the snapshot already exists. An empty subscriber list still writes
    /// the marker.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::RecordNotFound`] when the record does
    /// not exist.
    async fn create_subscriptions(
        &self,
        record_id: RecordId,
        interface_name: &InterfaceName,
        subscribers: &[ConnectorName],
        now: DateTime<Utc>,
    ) -> SubscriptionResult<usize>;

    /// Records a successful delivery for the subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`] when the subscription does
    /// not exist.
    async fn mark_processed(
        &self,
        record_id: RecordId,
        subscriber: &ConnectorName,
        now: DateTime<Utc>,
    ) -> SubscriptionResult<()>;

    /// Records a failed delivery for the subscriber.
    ///
    /// Returns `false` without changing anything when the subscription is
    /// already processed.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`] when the subscription does
    /// not exist.
    async fn mark_error(
        &self,
        record_id: RecordId,
        subscriber: &ConnectorName,
        message: &str,
        now: DateTime<Utc>,
    ) -> SubscriptionResult<bool>;

    /// Returns `true` iff the record has at least one subscription and all
    /// of them are processed.
    async fn all_processed(&self, record_id: RecordId) -> SubscriptionResult<bool>;

    /// Returns the record's subscriptions ordered by subscriber name.
    async fn list_for_record(&self, record_id: RecordId) -> SubscriptionResult<Vec<Subscription>>;
}

/// Errors returned by subscription tracker implementations.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    /// The owning record was not found.
    #[error("staged record not found: {0}")]
    RecordNotFound(RecordId),

    /// No subscription exists for the record and subscriber.
    #[error("no subscription for record {record_id} and subscriber {subscriber}")]
    NotFound {
        /// Record looked up.
        record_id: RecordId,
        /// Subscriber looked up.
        subscriber: ConnectorName,
    },

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl SubscriptionError {
    /// Wraps a data-quality or deserialization error from persisted rows.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
