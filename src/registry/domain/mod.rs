//! Domain model for registered connector instances.

mod error;
mod instance;

pub use error::RegistryDomainError;
pub use instance::{
    ConnectorInstance, ConnectorRole, InstanceGuid, NewConnectorInstance, PersistedInstanceData,
};
