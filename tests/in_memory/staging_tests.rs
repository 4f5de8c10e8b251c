//! In-memory integration tests for staging source batches.

use super::helpers::{Pipeline, name, orders, settings, source_with_rows};
use chrono::{TimeDelta, Utc};
use rstest::rstest;
use stagebox::connector::domain::PollState;
use stagebox::delivery::{domain::DeliverySettings, services::run_source_cycle};
use stagebox::staging::{
    domain::{RecordStatus, SubscriptionStatus},
    ports::{ClaimRequest, StagingStore, SubscriptionTracker},
};
use tokio_util::sync::CancellationToken;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn every_row_of_a_batch_becomes_one_subscribed_record(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let _billing = pipeline.add_destination("billing");
    let _warehouse = pipeline.add_destination("warehouse");
    let connector = source_with_rows(1..=5);

    let (next, report) = run_source_cycle(
        &pipeline.coordinator,
        &pipeline.source,
        &connector,
        &PollState::initial(),
        &CancellationToken::new(),
    )
    .await
    .expect("source cycle succeeds");

    assert_eq!(report.staged, 5);
    assert_eq!(next, PollState::at("5"));
    let counts = pipeline
        .store
        .status_counts(&orders())
        .await
        .expect("counts succeed");
    assert_eq!(counts.pending, 5);

    let unsubscribed = pipeline
        .store
        .find_unsubscribed(&orders(), 10)
        .await
        .expect("lookup succeeds");
    assert!(unsubscribed.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rereading_a_batch_does_not_stage_duplicates(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let _billing = pipeline.add_destination("billing");
    let connector = source_with_rows(1..=3);
    let cancel = CancellationToken::new();

    let (_, first) = run_source_cycle(
        &pipeline.coordinator,
        &pipeline.source,
        &connector,
        &PollState::initial(),
        &cancel,
    )
    .await
    .expect("first cycle succeeds");
    let (_, second) = run_source_cycle(
        &pipeline.coordinator,
        &pipeline.source,
        &connector,
        &PollState::initial(),
        &cancel,
    )
    .await
    .expect("second cycle succeeds");

    assert_eq!((first.staged, first.duplicates), (3, 0));
    assert_eq!((second.staged, second.duplicates), (0, 3));
    assert_eq!(pipeline.store.len().expect("box lock is healthy"), 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn snapshot_only_names_destinations_enabled_at_staging_time(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let _billing = pipeline.add_destination("billing");
    let warehouse = pipeline.add_destination("warehouse");
    pipeline.disable(&warehouse);
    let connector = source_with_rows([7]);

    run_source_cycle(
        &pipeline.coordinator,
        &pipeline.source,
        &connector,
        &PollState::initial(),
        &CancellationToken::new(),
    )
    .await
    .expect("source cycle succeeds");

    let record = pipeline
        .store
        .find_unsubscribed(&orders(), 10)
        .await
        .expect("lookup succeeds");
    assert!(record.is_empty());
    let staged = pipeline
        .store
        .claim_batch(&ClaimRequest {
            interface_name: orders(),
            subscriber: name("billing"),
            limit: 10,
            lock_duration: TimeDelta::seconds(5),
            now: Utc::now(),
        })
        .await
        .expect("claim succeeds");
    let [only] = staged.as_slice() else {
        panic!("expected one staged record, got {}", staged.len());
    };
    let subscriptions = pipeline
        .store
        .list_for_record(only.id())
        .await
        .expect("list succeeds");
    let subscribers: Vec<_> = subscriptions
        .iter()
        .map(|subscription| (subscription.subscriber().as_str(), subscription.status()))
        .collect();
    assert_eq!(subscribers, vec![("billing", SubscriptionStatus::Pending)]);
    assert_eq!(only.status(), RecordStatus::InProgress);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn records_without_destinations_stay_until_purged(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let connector = source_with_rows(1..=2);

    let (_, report) = run_source_cycle(
        &pipeline.coordinator,
        &pipeline.source,
        &connector,
        &PollState::initial(),
        &CancellationToken::new(),
    )
    .await
    .expect("source cycle succeeds");

    assert_eq!(report.orphaned, 2);
    assert_eq!(pipeline.store.len().expect("box lock is healthy"), 2);
    let purged = pipeline
        .store
        .purge_orphans(Utc::now() + TimeDelta::seconds(1))
        .await
        .expect("purge succeeds");
    assert_eq!(purged, 2);
    assert!(pipeline.store.is_empty().expect("box lock is healthy"));
}
