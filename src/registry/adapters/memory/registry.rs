//! Thread-safe in-memory instance registry.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::connector::domain::InterfaceName;
use crate::registry::{
    domain::{ConnectorInstance, ConnectorRole, InstanceGuid},
    ports::{InstanceRegistry, RegistryError, RegistryResult},
};

type Instances = BTreeMap<InstanceGuid, ConnectorInstance>;

/// In-memory registry keyed by instance identifier.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstanceRegistry {
    state: Arc<RwLock<Instances>>,
}

impl InMemoryInstanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `instances`.
    #[must_use]
    pub fn with_instances(instances: impl IntoIterator<Item = ConnectorInstance>) -> Self {
        let entries = instances
            .into_iter()
            .map(|instance| (instance.instance_guid(), instance))
            .collect();
        Self {
            state: Arc::new(RwLock::new(entries)),
        }
    }

    /// Adds or replaces an instance.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unavailable`] when the lock is poisoned.
    pub fn register(&self, instance: ConnectorInstance) -> RegistryResult<()> {
        let mut state = self.write_state()?;
        state.insert(instance.instance_guid(), instance);
        Ok(())
    }

    /// Enables or disables a registered instance.
    ///
    /// Returns `false` when no instance has the identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unavailable`] when the lock is poisoned.
    pub fn set_enabled(&self, guid: InstanceGuid, enabled: bool) -> RegistryResult<bool> {
        let mut state = self.write_state()?;
        let Some(instance) = state.get_mut(&guid) else {
            return Ok(false);
        };
        instance.set_enabled(enabled);
        Ok(true)
    }

    fn read_state(&self) -> RegistryResult<RwLockReadGuard<'_, Instances>> {
        self.state
            .read()
            .map_err(|err| RegistryError::unavailable(std::io::Error::other(err.to_string())))
    }

    fn write_state(&self) -> RegistryResult<RwLockWriteGuard<'_, Instances>> {
        self.state
            .write()
            .map_err(|err| RegistryError::unavailable(std::io::Error::other(err.to_string())))
    }
}

fn sorted_by_name(mut instances: Vec<ConnectorInstance>) -> Vec<ConnectorInstance> {
    instances.sort_by(|a, b| a.instance_name().cmp(b.instance_name()));
    instances
}

#[async_trait]
impl InstanceRegistry for InMemoryInstanceRegistry {
    async fn list_enabled_destinations(
        &self,
        interface_name: &InterfaceName,
    ) -> RegistryResult<Vec<ConnectorInstance>> {
        let state = self.read_state()?;
        let matching = state
            .values()
            .filter(|instance| instance.is_enabled_destination_for(interface_name))
            .cloned()
            .collect();
        Ok(sorted_by_name(matching))
    }

    async fn list_enabled_sources(&self) -> RegistryResult<Vec<ConnectorInstance>> {
        let state = self.read_state()?;
        let matching = state
            .values()
            .filter(|instance| instance.is_enabled() && instance.role() == ConnectorRole::Source)
            .cloned()
            .collect();
        Ok(sorted_by_name(matching))
    }
}
