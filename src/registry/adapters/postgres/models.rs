//! Diesel row models for connector instances.

use super::schema::connector_instances;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for connector instances.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = connector_instances)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ConnectorInstanceRow {
    /// Instance identifier.
    pub instance_guid: uuid::Uuid,
    /// Interface name.
    pub interface_name: String,
    /// Instance name.
    pub instance_name: String,
    /// Connector type.
    pub connector_name: String,
    /// Role.
    pub role: String,
    /// Enablement flag.
    pub is_enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
