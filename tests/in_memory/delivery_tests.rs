//! In-memory integration tests for delivering staged records.

use super::helpers::{Pipeline, destination, orders, settings, source_with_rows, written_ids};
use rstest::rstest;
use stagebox::connector::{domain::PollState, ports::WriteError};
use stagebox::delivery::{domain::DeliverySettings, services::run_source_cycle};
use stagebox::staging::ports::StagingStore;
use tokio_util::sync::CancellationToken;

async fn stage_rows(pipeline: &Pipeline, ids: impl IntoIterator<Item = i64>) {
    let connector = source_with_rows(ids);
    run_source_cycle(
        &pipeline.coordinator,
        &pipeline.source,
        &connector,
        &PollState::initial(),
        &CancellationToken::new(),
    )
    .await
    .expect("source cycle succeeds");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn every_destination_receives_every_record_once(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let billing = pipeline.add_destination("billing");
    let warehouse = pipeline.add_destination("warehouse");
    stage_rows(&pipeline, 1..=4).await;
    let billing_sink = destination();
    let warehouse_sink = destination();
    let cancel = CancellationToken::new();

    let first = pipeline
        .coordinator
        .deliver_batch(&billing, &billing_sink, &cancel)
        .await
        .expect("billing delivery succeeds");
    let second = pipeline
        .coordinator
        .deliver_batch(&warehouse, &warehouse_sink, &cancel)
        .await
        .expect("warehouse delivery succeeds");

    assert_eq!((first.delivered, first.deleted), (4, 0));
    assert_eq!((second.delivered, second.deleted), (4, 4));
    assert_eq!(written_ids(&billing_sink), vec![1, 2, 3, 4]);
    assert_eq!(written_ids(&warehouse_sink), vec![1, 2, 3, 4]);
    assert!(pipeline.store.is_empty().expect("box lock is healthy"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn a_failing_destination_does_not_hold_back_the_others(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let billing = pipeline.add_destination("billing");
    let warehouse = pipeline.add_destination("warehouse");
    stage_rows(&pipeline, 1..=2).await;
    let billing_sink = destination();
    billing_sink.fail_next_writes([
        WriteError::retryable("billing offline"),
        WriteError::retryable("billing offline"),
    ]);
    let warehouse_sink = destination();
    let cancel = CancellationToken::new();

    let failed = pipeline
        .coordinator
        .deliver_batch(&billing, &billing_sink, &cancel)
        .await
        .expect("billing delivery runs");
    let delivered = pipeline
        .coordinator
        .deliver_batch(&warehouse, &warehouse_sink, &cancel)
        .await
        .expect("warehouse delivery succeeds");

    assert_eq!(failed.failed, 2);
    assert_eq!(delivered.delivered, 2);
    assert_eq!(written_ids(&warehouse_sink), vec![1, 2]);
    let counts = pipeline
        .store
        .status_counts(&orders())
        .await
        .expect("counts succeed");
    assert_eq!(counts.pending, 2);
    assert_eq!(
        counts
            .subscriber_errors
            .get(billing.instance_name())
            .copied(),
        Some(2)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn retried_records_are_delivered_at_least_once(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let billing = pipeline.add_destination("billing");
    stage_rows(&pipeline, [1]).await;
    let sink = destination();
    sink.fail_next_writes([WriteError::retryable("timeout")]);
    let cancel = CancellationToken::new();

    let first = pipeline
        .coordinator
        .deliver_batch(&billing, &sink, &cancel)
        .await
        .expect("first attempt runs");
    let second = pipeline
        .coordinator
        .deliver_batch(&billing, &sink, &cancel)
        .await
        .expect("second attempt runs");

    assert_eq!(first.failed, 1);
    assert_eq!((second.delivered, second.deleted), (1, 1));
    assert_eq!(sink.write_attempts(), 2);
    assert_eq!(written_ids(&sink), vec![1]);
    assert!(pipeline.store.is_empty().expect("box lock is healthy"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn exhausted_records_park_in_dead_letter_until_requeued(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let billing = pipeline.add_destination("billing");
    stage_rows(&pipeline, [1]).await;
    let sink = destination();
    sink.fail_next_writes((0..3).map(|_| WriteError::retryable("rejected")));
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        pipeline
            .coordinator
            .deliver_batch(&billing, &sink, &cancel)
            .await
            .expect("delivery attempt runs");
    }
    let parked = pipeline
        .coordinator
        .deliver_batch(&billing, &sink, &cancel)
        .await
        .expect("delivery attempt runs");
    let counts = pipeline
        .store
        .status_counts(&orders())
        .await
        .expect("counts succeed");

    assert_eq!(parked.claimed, 0);
    assert_eq!(counts.dead_letter, 1);

    stage_rows(&pipeline, [1]).await;
    let after_restage = pipeline
        .store
        .status_counts(&orders())
        .await
        .expect("counts succeed");
    assert_eq!(after_restage.total(), 2);
    assert_eq!(after_restage.pending, 1);

    let redelivered = pipeline
        .coordinator
        .deliver_batch(&billing, &sink, &cancel)
        .await
        .expect("fresh copy is delivered");
    assert_eq!((redelivered.delivered, redelivered.deleted), (1, 1));
    assert_eq!(written_ids(&sink), vec![1]);
    assert_eq!(pipeline.store.len().expect("box lock is healthy"), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn permanent_failures_are_not_retried(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let billing = pipeline.add_destination("billing");
    stage_rows(&pipeline, [1, 2]).await;
    let sink = destination();
    sink.fail_next_writes([WriteError::permanent("schema mismatch")]);
    let cancel = CancellationToken::new();

    let report = pipeline
        .coordinator
        .deliver_batch(&billing, &sink, &cancel)
        .await
        .expect("delivery runs");

    assert_eq!(report.dead_lettered, 1);
    assert_eq!((report.delivered, report.deleted), (1, 1));
    let counts = pipeline
        .store
        .status_counts(&orders())
        .await
        .expect("counts succeed");
    assert_eq!(counts.dead_letter, 1);
    assert_eq!(counts.total(), 1);
    assert_eq!(written_ids(&sink), vec![2]);
}
