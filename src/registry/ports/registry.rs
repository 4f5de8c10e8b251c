//! Read-only registry port consumed by delivery services.

use crate::connector::domain::InterfaceName;
use crate::registry::domain::ConnectorInstance;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for registry lookups.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Lookup of configured connector instances.
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    /// Returns the enabled destination instances of an interface, ordered by
    /// instance name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unavailable`] when the registry cannot be
    /// read. Callers abort the current cycle without staging anything.
    async fn list_enabled_destinations(
        &self,
        interface_name: &InterfaceName,
    ) -> RegistryResult<Vec<ConnectorInstance>>;

    /// Returns every enabled source instance, ordered by instance name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unavailable`] when the registry cannot be
    /// read.
    async fn list_enabled_sources(&self) -> RegistryResult<Vec<ConnectorInstance>>;
}

/// Errors returned by registry implementations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The registry could not be read.
    #[error("instance registry unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),
}

impl RegistryError {
    /// Wraps a lookup failure.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }

    /// Wraps a data-quality or deserialization error from persisted rows.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }
}
