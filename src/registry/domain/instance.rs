//! Connector instance registry entries.

use super::RegistryDomainError;
use crate::connector::domain::{ConnectorKind, ConnectorName, InterfaceName};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a registered connector instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceGuid(Uuid);

impl InstanceGuid {
    /// Creates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for InstanceGuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an instance produces records or receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorRole {
    /// Reads records from an external system into the Box.
    Source,
    /// Writes records from the Box to an external system.
    Destination,
}

impl ConnectorRole {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

impl fmt::Display for ConnectorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConnectorRole {
    type Error = RegistryDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "destination" => Ok(Self::Destination),
            _ => Err(RegistryDomainError::UnknownRole(value.to_owned())),
        }
    }
}

/// Parameter object describing an instance to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnectorInstance {
    /// Interface the instance serves.
    pub interface_name: InterfaceName,
    /// Unique instance name; destinations subscribe under this name.
    pub instance_name: ConnectorName,
    /// Connector type implementing the instance.
    pub connector_kind: ConnectorKind,
    /// Source or destination.
    pub role: ConnectorRole,
}

/// A configured connector instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInstance {
    instance_guid: InstanceGuid,
    interface_name: InterfaceName,
    instance_name: ConnectorName,
    connector_kind: ConnectorKind,
    role: ConnectorRole,
    is_enabled: bool,
    created_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedInstanceData {
    /// Persisted identifier.
    pub instance_guid: InstanceGuid,
    /// Persisted interface name.
    pub interface_name: InterfaceName,
    /// Persisted instance name.
    pub instance_name: ConnectorName,
    /// Persisted connector type.
    pub connector_kind: ConnectorKind,
    /// Persisted role.
    pub role: ConnectorRole,
    /// Persisted enablement flag.
    pub is_enabled: bool,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ConnectorInstance {
    /// Creates an enabled instance.
    #[must_use]
    pub fn new(new_instance: NewConnectorInstance, clock: &impl Clock) -> Self {
        Self {
            instance_guid: InstanceGuid::new(),
            interface_name: new_instance.interface_name,
            instance_name: new_instance.instance_name,
            connector_kind: new_instance.connector_kind,
            role: new_instance.role,
            is_enabled: true,
            created_at: clock.utc(),
        }
    }

    /// Reconstructs an instance from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedInstanceData) -> Self {
        Self {
            instance_guid: data.instance_guid,
            interface_name: data.interface_name,
            instance_name: data.instance_name,
            connector_kind: data.connector_kind,
            role: data.role,
            is_enabled: data.is_enabled,
            created_at: data.created_at,
        }
    }

    /// Returns the instance identifier.
    #[must_use]
    pub const fn instance_guid(&self) -> InstanceGuid {
        self.instance_guid
    }

    /// Returns the interface name.
    #[must_use]
    pub const fn interface_name(&self) -> &InterfaceName {
        &self.interface_name
    }

    /// Returns the instance name.
    #[must_use]
    pub const fn instance_name(&self) -> &ConnectorName {
        &self.instance_name
    }

    /// Returns the connector type.
    #[must_use]
    pub const fn connector_kind(&self) -> &ConnectorKind {
        &self.connector_kind
    }

    /// Returns the role.
    #[must_use]
    pub const fn role(&self) -> ConnectorRole {
        self.role
    }

    /// Returns `true` when the instance takes part in delivery.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Enables or disables the instance.
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }

    /// Returns `true` for an enabled destination on `interface_name`.
    #[must_use]
    pub fn is_enabled_destination_for(&self, interface_name: &InterfaceName) -> bool {
        self.is_enabled
            && self.role == ConnectorRole::Destination
            && &self.interface_name == interface_name
    }
}
