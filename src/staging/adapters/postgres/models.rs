//! Diesel row models for staged records and subscriptions.

use super::schema::{staged_records, subscriptions};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for staged records.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = staged_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StagedRecordRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Interface name.
    pub interface_name: String,
    /// Source instance name.
    pub source_connector_name: String,
    /// Source connector type.
    pub source_connector_kind: String,
    /// Payload JSON array.
    pub payload: Value,
    /// Content hash.
    pub content_hash: String,
    /// Record status.
    pub status: String,
    /// Failed delivery attempts.
    pub retry_count: i32,
    /// Retry limit.
    pub max_retries: i32,
    /// Lock expiry.
    pub in_progress_until: Option<DateTime<Utc>>,
    /// Last failed attempt.
    pub last_retry_time: Option<DateTime<Utc>>,
    /// Snapshot marker.
    pub subscribed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insert model for staged records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = staged_records)]
pub struct NewStagedRecordRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Interface name.
    pub interface_name: String,
    /// Source instance name.
    pub source_connector_name: String,
    /// Source connector type.
    pub source_connector_kind: String,
    /// Payload JSON array.
    pub payload: Value,
    /// Content hash.
    pub content_hash: String,
    /// Record status.
    pub status: String,
    /// Failed delivery attempts.
    pub retry_count: i32,
    /// Retry limit.
    pub max_retries: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Query result row for subscriptions.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SubscriptionRow {
    /// Subscription identifier.
    pub id: uuid::Uuid,
    /// Owning record.
    pub record_id: uuid::Uuid,
    /// Interface name.
    pub interface_name: String,
    /// Subscriber name.
    pub subscriber_connector_name: String,
    /// Subscription status.
    pub status: String,
    /// Processing timestamp.
    pub processed_at: Option<DateTime<Utc>>,
    /// Last failure message.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for subscriptions.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct NewSubscriptionRow {
    /// Subscription identifier.
    pub id: uuid::Uuid,
    /// Owning record.
    pub record_id: uuid::Uuid,
    /// Interface name.
    pub interface_name: String,
    /// Subscriber name.
    pub subscriber_connector_name: String,
    /// Subscription status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
