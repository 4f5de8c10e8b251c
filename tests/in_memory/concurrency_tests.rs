//! In-memory integration tests for competing claimants.

use super::helpers::{Pipeline, destination, orders, name, settings, source_with_rows, written_ids};
use chrono::{TimeDelta, Utc};
use rstest::rstest;
use stagebox::connector::domain::PollState;
use stagebox::delivery::{domain::DeliverySettings, services::run_source_cycle};
use stagebox::staging::ports::{ClaimRequest, StagingStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn stage(pipeline: &Pipeline, count: i64) {
    let connector = source_with_rows(1..=count);
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
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_never_hand_out_the_same_record(settings: DeliverySettings) {
    let pipeline = Pipeline::new(settings);
    let _billing = pipeline.add_destination("billing");
    stage(&pipeline, 20).await;
    let now = Utc::now();

    let claimants: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&pipeline.store);
            tokio::spawn(async move {
                store
                    .claim_batch(&ClaimRequest {
                        interface_name: orders(),
                        subscriber: name("billing"),
                        limit: 3,
                        lock_duration: TimeDelta::seconds(30),
                        now,
                    })
                    .await
            })
        })
        .collect();

    let mut claimed = Vec::new();
    for claimant in claimants {
        let batch = claimant
            .await
            .expect("claimant task completes")
            .expect("claim succeeds");
        claimed.extend(batch.iter().map(|record| record.id()));
    }
    let distinct: BTreeSet<_> = claimed.iter().copied().collect();

    assert_eq!(claimed.len(), 20);
    assert_eq!(distinct.len(), 20);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_workers_for_one_destination_deliver_each_record_once(
    settings: DeliverySettings,
) {
    let pipeline = Arc::new(Pipeline::new(settings));
    let billing = pipeline.add_destination("billing");
    stage(&pipeline, 25).await;
    let sink = destination();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&pipeline);
            let worker_sink = sink.clone();
            let subscriber = billing.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                loop {
                    let report = shared
                        .coordinator
                        .deliver_batch(&subscriber, &worker_sink, &cancel)
                        .await
                        .expect("delivery runs");
                    if report.claimed == 0 {
                        break;
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.await.expect("worker task completes");
    }

    let mut delivered = written_ids(&sink);
    delivered.sort_unstable();
    assert_eq!(delivered, (1..=25).collect::<Vec<_>>());
    assert!(pipeline.store.is_empty().expect("box lock is healthy"));
}
