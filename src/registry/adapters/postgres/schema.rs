//! Diesel schema for connector instances.

diesel::table! {
    /// Configured connector instances, maintained by the administration UI.
    connector_instances (instance_guid) {
        /// Instance identifier.
        instance_guid -> Uuid,
        /// Interface the instance serves.
        #[max_length = 255]
        interface_name -> Varchar,
        /// Unique instance name.
        #[max_length = 255]
        instance_name -> Varchar,
        /// Connector type.
        #[max_length = 255]
        connector_name -> Varchar,
        /// `source` or `destination`.
        #[max_length = 20]
        role -> Varchar,
        /// Whether the instance takes part in delivery.
        is_enabled -> Bool,
        /// Creation timestamp.
        created_at -> Timestamptz,
    }
}
