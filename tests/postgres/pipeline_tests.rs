//! `PostgreSQL` tests for registry lookups and end-to-end delivery.

use super::helpers::{TemporaryDatabase, interface, temporary_database, test_runtime};
use chrono::TimeDelta;
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use rstest::rstest;
use serde_json::json;
use stagebox::connector::{
    adapters::memory::InMemoryConnector,
    domain::{FieldDescriptor, FieldType, PollState, RawRow},
    ports::WriteError,
};
use stagebox::delivery::{
    domain::DeliverySettings,
    services::{DeliveryCoordinator, run_source_cycle},
};
use stagebox::registry::{
    adapters::postgres::PostgresInstanceRegistry,
    domain::{ConnectorInstance, ConnectorRole},
    ports::InstanceRegistry,
};
use stagebox::staging::ports::StagingStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SEED_INSTANCES_SQL: &str = "
INSERT INTO connector_instances
    (instance_guid, interface_name, instance_name, connector_name, role, is_enabled)
VALUES
    (gen_random_uuid(), 'orders', 'erp', 'sql-server', 'source', TRUE),
    (gen_random_uuid(), 'orders', 'warehouse', 'rest', 'destination', TRUE),
    (gen_random_uuid(), 'orders', 'billing', 'rest', 'destination', TRUE),
    (gen_random_uuid(), 'orders', 'archive', 'sftp', 'destination', FALSE),
    (gen_random_uuid(), 'invoices', 'ledger', 'rest', 'destination', TRUE);
";

fn seeded_registry(database: &TemporaryDatabase) -> PostgresInstanceRegistry {
    database
        .execute(SEED_INSTANCES_SQL)
        .expect("instances are seeded");
    PostgresInstanceRegistry::new(database.pool().expect("pool builds"))
}

fn instance_names(instances: &[ConnectorInstance]) -> Vec<&str> {
    instances
        .iter()
        .map(|instance| instance.instance_name().as_str())
        .collect()
}

#[rstest]
fn registry_lists_enabled_instances_by_name(shared_test_cluster: &'static TestCluster) {
    let database = temporary_database(shared_test_cluster);
    test_runtime().block_on(async {
        let registry = seeded_registry(&database);

        let destinations = registry
            .list_enabled_destinations(&interface("orders"))
            .await
            .expect("lookup succeeds");
        let sources = registry
            .list_enabled_sources()
            .await
            .expect("lookup succeeds");

        assert_eq!(instance_names(&destinations), vec!["billing", "warehouse"]);
        assert!(
            destinations
                .iter()
                .all(|instance| instance.role() == ConnectorRole::Destination)
        );
        assert_eq!(instance_names(&sources), vec!["erp"]);
    });
}

#[rstest]
fn records_reach_every_destination_and_leave_the_box(shared_test_cluster: &'static TestCluster) {
    let database = temporary_database(shared_test_cluster);
    test_runtime().block_on(async {
        let registry = Arc::new(seeded_registry(&database));
        let store = Arc::new(database.staging_box().expect("pool builds"));
        let coordinator = DeliveryCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::new(DefaultClock),
            DeliverySettings {
                batch_size: 10,
                lock_duration: TimeDelta::seconds(30),
                max_retries: 3,
                ..DeliverySettings::default()
            },
        );
        let source = registry
            .list_enabled_sources()
            .await
            .expect("lookup succeeds")
            .into_iter()
            .next()
            .expect("erp is registered");
        let destinations = registry
            .list_enabled_destinations(&interface("orders"))
            .await
            .expect("lookup succeeds");

        let reader = InMemoryConnector::new(vec![
            FieldDescriptor::new("id", FieldType::Integer),
            FieldDescriptor::new("total", FieldType::Decimal),
        ]);
        reader.push_rows((1..=3).map(|id| {
            RawRow::new()
                .with("id", json!(id))
                .with("total", json!(format!("{id}.50")))
        }));
        let (_, staged) = run_source_cycle(
            &coordinator,
            &source,
            &reader,
            &PollState::initial(),
            &CancellationToken::new(),
        )
        .await
        .expect("source cycle succeeds");
        assert_eq!(staged.staged, 3);

        let cancel = CancellationToken::new();
        for destination in &destinations {
            let writer = InMemoryConnector::new(Vec::new());
            writer.fail_next_writes([WriteError::retryable("warming up")]);
            let first = coordinator
                .deliver_batch(destination, &writer, &cancel)
                .await
                .expect("delivery runs");
            let second = coordinator
                .deliver_batch(destination, &writer, &cancel)
                .await
                .expect("delivery runs");
            assert_eq!(first.failed + first.delivered + second.delivered, 4);
            assert_eq!(writer.written().len(), 3);
        }

        let counts = store
            .status_counts(&interface("orders"))
            .await
            .expect("counts succeed");
        assert_eq!(counts.total(), 0);
    });
}
