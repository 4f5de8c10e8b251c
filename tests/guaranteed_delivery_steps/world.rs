//! Shared world state for guaranteed delivery BDD scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::TimeDelta;
use mockable::DefaultClock;
use rstest::fixture;
use stagebox::connector::{
    adapters::memory::InMemoryConnector,
    domain::{ConnectorKind, ConnectorName, InterfaceName},
};
use stagebox::delivery::{
    domain::{DeliverySettings, StageReport},
    services::DeliveryCoordinator,
};
use stagebox::registry::{
    adapters::memory::InMemoryInstanceRegistry,
    domain::{ConnectorInstance, ConnectorRole, NewConnectorInstance},
};
use stagebox::staging::{adapters::memory::InMemoryStagingBox, domain::RecordId};

/// Coordinator type used by the BDD world.
pub type WorldCoordinator = DeliveryCoordinator<
    InMemoryStagingBox,
    InMemoryStagingBox,
    InMemoryInstanceRegistry,
    DefaultClock,
>;

/// Scenario world for guaranteed delivery behaviour tests.
pub struct DeliveryWorld {
    pub store: Arc<InMemoryStagingBox>,
    pub registry: Arc<InMemoryInstanceRegistry>,
    pub settings: DeliverySettings,
    pub interface: Option<InterfaceName>,
    pub source: Option<ConnectorInstance>,
    pub source_connector: InMemoryConnector,
    pub destinations: BTreeMap<String, ConnectorInstance>,
    pub last_stage: Option<StageReport>,
    pub record_id: Option<RecordId>,
}

impl DeliveryWorld {
    /// Creates a world with an empty Box and registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStagingBox::new()),
            registry: Arc::new(InMemoryInstanceRegistry::new()),
            settings: DeliverySettings {
                batch_size: 10,
                lock_duration: TimeDelta::seconds(30),
                max_retries: 5,
                ..DeliverySettings::default()
            },
            interface: None,
            source: None,
            source_connector: InMemoryConnector::new(Vec::new()),
            destinations: BTreeMap::new(),
            last_stage: None,
            record_id: None,
        }
    }

    /// Builds a coordinator over the world's Box and registry.
    #[must_use]
    pub fn coordinator(&self) -> WorldCoordinator {
        DeliveryCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::new(DefaultClock),
            self.settings,
        )
    }

    /// Registers an enabled instance on the scenario's interface.
    ///
    /// # Errors
    ///
    /// Returns an error if no interface was set up or a name is invalid.
    pub fn register(
        &self,
        instance_name: &str,
        role: ConnectorRole,
    ) -> Result<ConnectorInstance, eyre::Report> {
        let instance = ConnectorInstance::new(
            NewConnectorInstance {
                interface_name: self.interface()?.clone(),
                instance_name: ConnectorName::new(instance_name)?,
                connector_kind: ConnectorKind::new("memory")?,
                role,
            },
            &DefaultClock,
        );
        self.registry.register(instance.clone())?;
        Ok(instance)
    }

    /// Returns the scenario's interface.
    ///
    /// # Errors
    ///
    /// Returns an error if no interface was set up.
    pub fn interface(&self) -> Result<&InterfaceName, eyre::Report> {
        self.interface
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing interface in scenario world"))
    }

    /// Returns the scenario's source instance.
    ///
    /// # Errors
    ///
    /// Returns an error if no source was registered.
    pub fn source(&self) -> Result<&ConnectorInstance, eyre::Report> {
        self.source
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing source in scenario world"))
    }

    /// Returns a registered destination by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination is unknown.
    pub fn destination(&self, name: &str) -> Result<&ConnectorInstance, eyre::Report> {
        self.destinations
            .get(name)
            .ok_or_else(|| eyre::eyre!("unknown destination {name}"))
    }

    /// Returns the record staged by the scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing was staged yet.
    pub fn record_id(&self) -> Result<RecordId, eyre::Report> {
        self.record_id
            .ok_or_else(|| eyre::eyre!("missing staged record in scenario world"))
    }
}

impl Default for DeliveryWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> DeliveryWorld {
    DeliveryWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
