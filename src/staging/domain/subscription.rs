//! Per-record delivery obligations.

use super::{RecordId, SubscriptionId, SubscriptionStatus};
use crate::connector::domain::{ConnectorName, InterfaceName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One destination's obligation to process one staged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    id: SubscriptionId,
    record_id: RecordId,
    interface_name: InterfaceName,
    subscriber: ConnectorName,
    status: SubscriptionStatus,
    processed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSubscriptionData {
    /// Persisted subscription identifier.
    pub id: SubscriptionId,
    /// Owning record.
    pub record_id: RecordId,
    /// Persisted interface name.
    pub interface_name: InterfaceName,
    /// Persisted subscriber name.
    pub subscriber: ConnectorName,
    /// Persisted status.
    pub status: SubscriptionStatus,
    /// Persisted processing timestamp.
    pub processed_at: Option<DateTime<Utc>>,
    /// Persisted failure message.
    pub error_message: Option<String>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Creates a pending subscription.
    #[must_use]
    pub fn new(
        record_id: RecordId,
        interface_name: InterfaceName,
        subscriber: ConnectorName,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            record_id,
            interface_name,
            subscriber,
            status: SubscriptionStatus::Pending,
            processed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstructs a subscription from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedSubscriptionData) -> Self {
        Self {
            id: data.id,
            record_id: data.record_id,
            interface_name: data.interface_name,
            subscriber: data.subscriber,
            status: data.status,
            processed_at: data.processed_at,
            error_message: data.error_message,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the subscription identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the owning record identifier.
    #[must_use]
    pub const fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Returns the interface name.
    #[must_use]
    pub const fn interface_name(&self) -> &InterfaceName {
        &self.interface_name
    }

    /// Returns the subscriber name.
    #[must_use]
    pub const fn subscriber(&self) -> &ConnectorName {
        &self.subscriber
    }

    /// Returns the delivery status.
    #[must_use]
    pub const fn status(&self) -> SubscriptionStatus {
        self.status
    }

    /// Returns when the record was processed, if it was.
    #[must_use]
    pub const fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    /// Returns the last failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Records a successful delivery and clears any earlier failure.
    pub fn mark_processed(&mut self, now: DateTime<Utc>) {
        self.status = SubscriptionStatus::Processed;
        self.processed_at = Some(now);
        self.error_message = None;
        self.updated_at = now;
    }

    /// Records a failed delivery and returns `true`.
    ///
    /// A processed subscription is left untouched and `false` is returned.
    pub fn mark_error(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.status == SubscriptionStatus::Processed {
            return false;
        }
        self.status = SubscriptionStatus::Error;
        self.error_message = Some(message.into());
        self.updated_at = now;
        true
    }

    /// Puts a failed subscription back in the pending state, keeping the
    /// last failure message for inspection.
    pub fn reset_error(&mut self, now: DateTime<Utc>) {
        if self.status == SubscriptionStatus::Error {
            self.status = SubscriptionStatus::Pending;
            self.updated_at = now;
        }
    }
}
