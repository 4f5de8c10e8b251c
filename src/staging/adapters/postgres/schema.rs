//! Diesel schema for staged records and subscriptions.

diesel::table! {
    /// Records waiting for delivery to every subscriber.
    staged_records (id) {
        /// Record identifier.
        id -> Uuid,
        /// Route the record travels on.
        #[max_length = 255]
        interface_name -> Varchar,
        /// Source instance that produced the record.
        #[max_length = 255]
        source_connector_name -> Varchar,
        /// Connector type of the source instance.
        #[max_length = 255]
        source_connector_kind -> Varchar,
        /// Ordered payload fields.
        payload -> Jsonb,
        /// Hex SHA-256 of interface and payload.
        #[max_length = 64]
        content_hash -> Varchar,
        /// Record status.
        #[max_length = 20]
        status -> Varchar,
        /// Failed delivery attempts.
        retry_count -> Int4,
        /// Failed attempts tolerated before dead-lettering.
        max_retries -> Int4,
        /// Lock expiry.
        in_progress_until -> Nullable<Timestamptz>,
        /// Time of the last failed attempt.
        last_retry_time -> Nullable<Timestamptz>,
        /// Time the subscription snapshot was written.
        subscribed_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per-record delivery obligations, deleted with their record.
    subscriptions (id) {
        /// Subscription identifier.
        id -> Uuid,
        /// Owning record.
        record_id -> Uuid,
        /// Route the record travels on.
        #[max_length = 255]
        interface_name -> Varchar,
        /// Destination instance that must process the record.
        #[max_length = 255]
        subscriber_connector_name -> Varchar,
        /// Subscription status.
        #[max_length = 20]
        status -> Varchar,
        /// Processing timestamp.
        processed_at -> Nullable<Timestamptz>,
        /// Last failure message.
        error_message -> Nullable<Text>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(subscriptions -> staged_records (record_id));
diesel::allow_tables_to_appear_in_same_query!(staged_records, subscriptions);
