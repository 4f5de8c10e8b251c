//! `PostgreSQL` tests for the atomic lock-and-fetch.

use super::helpers::{interface, name, order_record, temporary_database, test_runtime};
use chrono::{DateTime, TimeDelta, Utc};
use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use rstest::rstest;
use stagebox::staging::{
    adapters::postgres::PostgresStagingBox,
    domain::{RecordId, RecordStatus},
    ports::{ClaimRequest, StagingStore, StagingStoreError, SubscriptionTracker},
};
use std::collections::BTreeSet;
use std::sync::Arc;

fn claim(subscriber: &str, limit: usize, now: DateTime<Utc>) -> ClaimRequest {
    ClaimRequest {
        interface_name: interface("orders"),
        subscriber: name(subscriber),
        limit,
        lock_duration: TimeDelta::seconds(30),
        now,
    }
}

async fn stage_subscribed(store: &PostgresStagingBox, count: i64) -> Vec<RecordId> {
    let mut ids = Vec::new();
    for id in 1..=count {
        let record = order_record("orders", id, 3);
        store.stage(&record).await.expect("stage succeeds");
        store
            .create_subscriptions(
                record.id(),
                &interface("orders"),
                &[name("billing"), name("warehouse")],
                record.created_at(),
            )
            .await
            .expect("subscriptions created");
        ids.push(record.id());
    }
    ids
}

#[rstest]
fn claims_are_oldest_first_and_locked_until_expiry(shared_test_cluster: &'static TestCluster) {
    let database = temporary_database(shared_test_cluster);
    test_runtime().block_on(async {
        let store = database.staging_box().expect("pool builds");
        let ids = stage_subscribed(&store, 3).await;
        let now = Utc::now();

        let first = store
            .claim_batch(&claim("billing", 2, now))
            .await
            .expect("claim succeeds");
        let second = store
            .claim_batch(&claim("billing", 5, now))
            .await
            .expect("claim succeeds");
        let after_expiry = store
            .claim_batch(&claim("billing", 5, now + TimeDelta::seconds(31)))
            .await
            .expect("claim succeeds");

        let claimed: Vec<_> = first.iter().map(|record| record.id()).collect();
        assert_eq!(claimed, ids.iter().copied().take(2).collect::<Vec<_>>());
        assert!(first.iter().all(|record| record.status() == RecordStatus::InProgress));
        assert!(
            first
                .iter()
                .all(|record| record.in_progress_until().is_some_and(|until| until > now))
        );
        assert_eq!(second.len(), 1);
        assert_eq!(after_expiry.len(), 3);
    });
}

#[rstest]
fn processed_subscribers_no_longer_claim_the_record(shared_test_cluster: &'static TestCluster) {
    let database = temporary_database(shared_test_cluster);
    test_runtime().block_on(async {
        let store = database.staging_box().expect("pool builds");
        let ids = stage_subscribed(&store, 1).await;
        let record_id = *ids.first().expect("one record");
        store
            .mark_processed(record_id, &name("billing"), Utc::now())
            .await
            .expect("mark processed succeeds");

        let billing = store
            .claim_batch(&claim("billing", 5, Utc::now()))
            .await
            .expect("claim succeeds");
        let stranger = store
            .claim_batch(&claim("reporting", 5, Utc::now()))
            .await
            .expect("claim succeeds");
        let warehouse = store
            .claim_batch(&claim("warehouse", 5, Utc::now()))
            .await
            .expect("claim succeeds");

        assert!(billing.is_empty());
        assert!(stranger.is_empty());
        assert_eq!(warehouse.len(), 1);
    });
}

#[rstest]
fn release_and_sweep_return_records_to_pending(shared_test_cluster: &'static TestCluster) {
    let database = temporary_database(shared_test_cluster);
    test_runtime().block_on(async {
        let store = database.staging_box().expect("pool builds");
        stage_subscribed(&store, 2).await;
        let now = Utc::now();
        let request = claim("billing", 2, now);
        let claimed = store.claim_batch(&request).await.expect("claim succeeds");
        let [released, abandoned] = claimed.as_slice() else {
            panic!("expected two claimed records");
        };

        let applied = store
            .release_lock(released.id(), request.lock_token().expect("valid lock"))
            .await
            .expect("release succeeds");
        assert!(applied);
        let early = store
            .release_stale_locks(now + TimeDelta::seconds(10))
            .await
            .expect("sweep succeeds");
        let late = store
            .release_stale_locks(now + TimeDelta::seconds(31))
            .await
            .expect("sweep succeeds");

        assert_eq!((early, late), (0, 1));
        let stored = store
            .find(abandoned.id())
            .await
            .expect("find succeeds")
            .expect("record exists");
        assert_eq!(stored.status(), RecordStatus::Pending);
        assert!(stored.in_progress_until().is_none());
    });
}

#[rstest]
fn concurrent_claimants_receive_disjoint_batches(shared_test_cluster: &'static TestCluster) {
    let database = temporary_database(shared_test_cluster);
    test_runtime().block_on(async {
        let store = Arc::new(database.staging_box().expect("pool builds"));
        stage_subscribed(&store, 12).await;
        let now = Utc::now();

        let claimants: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&store);
                tokio::spawn(async move { shared.claim_batch(&claim("billing", 5, now)).await })
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

        assert_eq!(distinct.len(), claimed.len());
        assert_eq!(claimed.len(), 12);
    });
}

#[rstest]
fn stale_claimant_cannot_release_a_reclaimed_record(shared_test_cluster: &'static TestCluster) {
    let database = temporary_database(shared_test_cluster);
    test_runtime().block_on(async {
        let store = database.staging_box().expect("pool builds");
        let ids = stage_subscribed(&store, 1).await;
        let record_id = *ids.first().expect("one record");
        let now = Utc::now();
        let expired_claim = claim("billing", 5, now);
        let takeover_claim = claim("billing", 5, now + TimeDelta::seconds(60));
        store
            .claim_batch(&expired_claim)
            .await
            .expect("claim succeeds");
        let taken_over = store
            .claim_batch(&takeover_claim)
            .await
            .expect("claim succeeds");
        assert_eq!(taken_over.len(), 1);
        let expired = expired_claim.lock_token().expect("valid lock");
        let current = takeover_claim.lock_token().expect("valid lock");

        let released = store
            .release_lock(record_id, expired)
            .await
            .expect("release runs");
        let parked = store
            .mark_dead_letter(record_id, expired)
            .await
            .expect("dead-letter runs");
        let competing = store
            .claim_batch(&claim("billing", 5, now + TimeDelta::seconds(61)))
            .await
            .expect("claim succeeds");

        assert!(!released);
        assert!(!parked);
        assert!(competing.is_empty());
        let stored = store
            .find(record_id)
            .await
            .expect("find succeeds")
            .expect("record exists");
        assert_eq!(stored.status(), RecordStatus::InProgress);
        assert!(
            store
                .release_lock(record_id, current)
                .await
                .expect("release runs")
        );
        let missing = store.release_lock(RecordId::new(), current).await;
        assert!(matches!(missing, Err(StagingStoreError::NotFound(_))));
    });
}
