//! Shared test helpers for `PostgreSQL` integration tests.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::TestCluster;
use serde_json::json;
use stagebox::connector::domain::{ConnectorKind, ConnectorName, FieldType, InterfaceName, Payload};
use stagebox::staging::{
    adapters::postgres::{PostgresStagingBox, StagingPgPool},
    domain::{NewStagedRecord, StagedRecord},
};
use tokio::runtime::Runtime;
use uuid::Uuid;

/// Boxed error type for fallible helpers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// SQL creating the staging tables.
pub const CREATE_STAGING_SQL: &str =
    include_str!("../../migrations/2026-01-05-000000_create_staging_tables/up.sql");

/// SQL creating the connector instance table.
pub const CREATE_INSTANCES_SQL: &str =
    include_str!("../../migrations/2026-01-05-000001_create_connector_instances/up.sql");

/// Template database name for the pre-migrated schema.
pub const TEMPLATE_DB: &str = "stagebox_test_template";

/// Creates a multi-threaded runtime for driving the async store in tests.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
#[must_use]
pub fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create test runtime")
}

/// Ensures the template database exists with both migrations applied.
///
/// # Errors
///
/// Returns an error if template creation or a migration fails.
pub fn ensure_template(cluster: &TestCluster) -> Result<(), BoxError> {
    cluster
        .ensure_template_exists(TEMPLATE_DB, |db_name| {
            let url = cluster.connection().database_url(db_name);
            let mut conn = PgConnection::establish(&url).map_err(|e| eyre::eyre!("{e}"))?;
            conn.batch_execute(CREATE_STAGING_SQL)
                .map_err(|e| eyre::eyre!("staging migration failed: {e}"))?;
            conn.batch_execute(CREATE_INSTANCES_SQL)
                .map_err(|e| eyre::eyre!("instance migration failed: {e}"))?;
            Ok(())
        })
        .map_err(|e| Box::new(e) as BoxError)?;
    Ok(())
}

/// A database cloned from the template and dropped when the guard goes out
/// of scope.
pub struct TemporaryDatabase {
    cluster: &'static TestCluster,
    name: String,
    url: String,
}

impl TemporaryDatabase {
    /// Clones a fresh database from the migrated template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template or the database cannot be created.
    pub fn create(cluster: &'static TestCluster) -> Result<Self, BoxError> {
        ensure_template(cluster)?;
        let name = format!("stagebox_test_{}", Uuid::new_v4().simple());
        cluster
            .create_database_from_template(name.as_str(), TEMPLATE_DB)
            .map_err(|e| Box::new(e) as BoxError)?;
        let url = cluster.connection().database_url(&name);
        Ok(Self { cluster, name, url })
    }

    /// Returns the connection URL of the temporary database.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Builds a small connection pool for the temporary database.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect.
    pub fn pool(&self) -> Result<StagingPgPool, BoxError> {
        let manager = ConnectionManager::<PgConnection>::new(self.url.as_str());
        Ok(Pool::builder().max_size(4).build(manager)?)
    }

    /// Builds a Box over a fresh pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect.
    pub fn staging_box(&self) -> Result<PostgresStagingBox, BoxError> {
        Ok(PostgresStagingBox::new(self.pool()?))
    }

    /// Runs raw SQL against the temporary database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or statement fails.
    pub fn execute(&self, sql: &str) -> Result<(), BoxError> {
        let mut connection = PgConnection::establish(&self.url)?;
        connection.batch_execute(sql)?;
        Ok(())
    }
}

impl Drop for TemporaryDatabase {
    fn drop(&mut self) {
        if let Err(err) = self.cluster.drop_database(self.name.as_str()) {
            tracing::warn!(database = %self.name, error = %err, "failed to drop test database");
        }
    }
}

/// Returns a migrated database on the shared embedded cluster.
///
/// # Panics
///
/// Panics if the database cannot be created.
#[must_use]
pub fn temporary_database(cluster: &'static TestCluster) -> TemporaryDatabase {
    TemporaryDatabase::create(cluster).expect("temporary database is created")
}

/// Returns a validated interface name.
///
/// # Panics
///
/// Panics if `value` is not a valid interface name.
#[must_use]
pub fn interface(value: &str) -> InterfaceName {
    InterfaceName::new(value).expect("valid interface name")
}

/// Returns a validated connector name.
///
/// # Panics
///
/// Panics if `value` is not a valid connector name.
#[must_use]
pub fn name(value: &str) -> ConnectorName {
    ConnectorName::new(value).expect("valid connector name")
}

/// Builds an order record for `interface_name` with the given id.
///
/// # Panics
///
/// Never in practice; the literals are valid names.
#[must_use]
pub fn order_record(interface_name: &str, id: i64, max_retries: u32) -> StagedRecord {
    StagedRecord::new(
        NewStagedRecord {
            interface_name: interface(interface_name),
            source_connector_name: name("erp"),
            source_connector_kind: ConnectorKind::new("postgres").expect("valid kind"),
            payload: Payload::new()
                .with_field("id", FieldType::Integer, json!(id))
                .with_field("sku", FieldType::Text, json!(format!("SKU-{id}"))),
            max_retries,
        },
        &DefaultClock,
    )
}
