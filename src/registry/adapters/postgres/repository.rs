//! Read-only `PostgreSQL` instance registry.

use super::{models::ConnectorInstanceRow, schema::connector_instances};
use crate::connector::domain::{ConnectorKind, ConnectorName, InterfaceName};
use crate::registry::{
    domain::{ConnectorInstance, ConnectorRole, InstanceGuid, PersistedInstanceData},
    ports::{InstanceRegistry, RegistryError, RegistryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

/// `PostgreSQL` connection pool type used by the registry adapter.
pub type RegistryPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed instance registry.
#[derive(Debug, Clone)]
pub struct PostgresInstanceRegistry {
    pool: RegistryPgPool,
}

impl PostgresInstanceRegistry {
    /// Creates a registry reader from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: RegistryPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> RegistryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> RegistryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(RegistryError::unavailable)?;
            f(&mut connection)
        })
        .await
        .map_err(RegistryError::unavailable)?
    }
}

#[async_trait]
impl InstanceRegistry for PostgresInstanceRegistry {
    async fn list_enabled_destinations(
        &self,
        interface_name: &InterfaceName,
    ) -> RegistryResult<Vec<ConnectorInstance>> {
        let interface = interface_name.as_str().to_owned();
        self.run_blocking(move |connection| {
            connector_instances::table
                .filter(connector_instances::interface_name.eq(&interface))
                .filter(connector_instances::role.eq(ConnectorRole::Destination.as_str()))
                .filter(connector_instances::is_enabled.eq(true))
                .order(connector_instances::instance_name.asc())
                .select(ConnectorInstanceRow::as_select())
                .load::<ConnectorInstanceRow>(connection)
                .map_err(RegistryError::unavailable)?
                .into_iter()
                .map(row_to_instance)
                .collect()
        })
        .await
    }

    async fn list_enabled_sources(&self) -> RegistryResult<Vec<ConnectorInstance>> {
        self.run_blocking(move |connection| {
            connector_instances::table
                .filter(connector_instances::role.eq(ConnectorRole::Source.as_str()))
                .filter(connector_instances::is_enabled.eq(true))
                .order(connector_instances::instance_name.asc())
                .select(ConnectorInstanceRow::as_select())
                .load::<ConnectorInstanceRow>(connection)
                .map_err(RegistryError::unavailable)?
                .into_iter()
                .map(row_to_instance)
                .collect()
        })
        .await
    }
}

fn row_to_instance(row: ConnectorInstanceRow) -> RegistryResult<ConnectorInstance> {
    let data = PersistedInstanceData {
        instance_guid: InstanceGuid::from_uuid(row.instance_guid),
        interface_name: InterfaceName::new(row.interface_name)
            .map_err(RegistryError::invalid_persisted_data)?,
        instance_name: ConnectorName::new(row.instance_name)
            .map_err(RegistryError::invalid_persisted_data)?,
        connector_kind: ConnectorKind::new(row.connector_name)
            .map_err(RegistryError::invalid_persisted_data)?,
        role: ConnectorRole::try_from(row.role.as_str())
            .map_err(RegistryError::invalid_persisted_data)?,
        is_enabled: row.is_enabled,
        created_at: row.created_at,
    };
    Ok(ConnectorInstance::from_persisted(data))
}
