//! `PostgreSQL` implementation of the staging store and subscription tracker.

use super::{
    blocking::{StagingPgPool, run_blocking},
    models::{NewStagedRecordRow, NewSubscriptionRow, StagedRecordRow, SubscriptionRow},
    schema::{staged_records, subscriptions},
};
use crate::connector::domain::{ConnectorKind, ConnectorName, InterfaceName, Payload};
use crate::staging::{
    domain::{
        ContentHash, LockToken, PersistedRecordData, PersistedSubscriptionData, RecordId,
        RecordStatus, StageOutcome, StagedRecord, StagingCounts, Subscription, SubscriptionId,
        SubscriptionStatus,
    },
    ports::{
        ClaimRequest, StagingResult, StagingStore, StagingStoreError, SubscriptionError,
        SubscriptionResult, SubscriptionTracker,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Text, Timestamptz};

const PENDING: &str = "pending";
const IN_PROGRESS: &str = "in_progress";
const DEAD_LETTER: &str = "dead_letter";
const PROCESSED: &str = "processed";
const ERROR: &str = "error";

/// Locks and returns claimable records in one statement.
///
/// `SKIP LOCKED` keeps concurrent claimants from blocking on, or both
/// receiving, the same rows. Rows committed by a faster claimant are
/// re-checked against the lock-expiry predicate and dropped.
const CLAIM_SQL: &str = concat!(
    "WITH claimable AS (",
    "SELECT r.id FROM staged_records r ",
    "WHERE r.interface_name = $1 ",
    "AND r.status <> 'dead_letter' ",
    "AND (r.in_progress_until IS NULL OR r.in_progress_until < $3) ",
    "AND EXISTS (SELECT 1 FROM subscriptions s WHERE s.record_id = r.id ",
    "AND s.subscriber_connector_name = $2 AND s.status <> 'processed') ",
    "ORDER BY r.created_at ASC, r.id ASC ",
    "LIMIT $4 ",
    "FOR UPDATE OF r SKIP LOCKED) ",
    "UPDATE staged_records t SET status = 'in_progress', in_progress_until = $5 ",
    "FROM claimable WHERE t.id = claimable.id ",
    "RETURNING t.id, t.interface_name, t.source_connector_name, t.source_connector_kind, ",
    "t.payload, t.content_hash, t.status, t.retry_count, t.max_retries, ",
    "t.in_progress_until, t.last_retry_time, t.subscribed_at, t.created_at",
);

const RELEASE_LOCK_SQL: &str = concat!(
    "UPDATE staged_records SET in_progress_until = NULL, ",
    "status = CASE WHEN status = 'in_progress' THEN 'pending' ELSE status END ",
    "WHERE id = $1 AND in_progress_until = $2",
);

const PURGE_ORPHANS_SQL: &str = concat!(
    "DELETE FROM staged_records r ",
    "WHERE r.subscribed_at IS NOT NULL AND r.created_at < $1 ",
    "AND NOT EXISTS (SELECT 1 FROM subscriptions s WHERE s.record_id = r.id)",
);

/// `PostgreSQL`-backed Box.
///
/// Uses Diesel with an r2d2 pool; every call runs on the blocking thread
/// pool. Deleting a record relies on `ON DELETE CASCADE` to remove its
/// subscriptions.
#[derive(Debug, Clone)]
pub struct PostgresStagingBox {
    pool: StagingPgPool,
}

impl PostgresStagingBox {
    /// Creates a new Box from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: StagingPgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &StagingPgPool {
        &self.pool
    }
}

#[async_trait]
impl StagingStore for PostgresStagingBox {
    async fn stage(&self, record: &StagedRecord) -> StagingResult<StageOutcome> {
        let new_row = to_new_row(record)?;
        let record_id = record.id();
        let interface = record.interface_name().as_str().to_owned();
        let content_hash = record.content_hash().as_str().to_owned();

        run_blocking(&self.pool, move |connection| {
            // The partial unique index on active (interface, hash) pairs turns
            // a concurrent duplicate insert into a no-op.
            let inserted = diesel::insert_into(staged_records::table)
                .values(&new_row)
                .on_conflict_do_nothing()
                .execute(connection)?;
            if inserted == 1 {
                return Ok(StageOutcome::Staged(record_id));
            }

            let existing = staged_records::table
                .filter(staged_records::interface_name.eq(&interface))
                .filter(staged_records::content_hash.eq(&content_hash))
                .filter(staged_records::status.ne(DEAD_LETTER))
                .select(staged_records::id)
                .first::<uuid::Uuid>(connection)
                .optional()?;
            let duplicate_of = existing.map_or(record_id, RecordId::from_uuid);
            Ok(StageOutcome::Duplicate(duplicate_of))
        })
        .await
    }

    async fn find(&self, id: RecordId) -> StagingResult<Option<StagedRecord>> {
        run_blocking(&self.pool, move |connection| {
            let row = staged_records::table
                .find(id.into_inner())
                .select(StagedRecordRow::as_select())
                .first::<StagedRecordRow>(connection)
                .optional()?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn claim_batch(&self, request: &ClaimRequest) -> StagingResult<Vec<StagedRecord>> {
        let interface = request.interface_name.as_str().to_owned();
        let subscriber_name = request.subscriber.as_str().to_owned();
        let row_limit = i64::try_from(request.limit).unwrap_or(i64::MAX);
        let now = request.now;
        let until = request.lock_token()?.expires_at();

        run_blocking(&self.pool, move |connection| {
            let rows = diesel::sql_query(CLAIM_SQL)
                .bind::<Text, _>(interface)
                .bind::<Text, _>(subscriber_name)
                .bind::<Timestamptz, _>(now)
                .bind::<BigInt, _>(row_limit)
                .bind::<Timestamptz, _>(until)
                .load::<StagedRecordRow>(connection)?;
            let mut records = rows
                .into_iter()
                .map(row_to_record)
                .collect::<StagingResult<Vec<_>>>()?;
            // RETURNING does not preserve the CTE ordering.
            records.sort_by_key(|record| (record.created_at(), record.id()));
            Ok(records)
        })
        .await
    }

    async fn release_lock(&self, id: RecordId, token: LockToken) -> StagingResult<bool> {
        run_blocking(&self.pool, move |connection| {
            let updated = diesel::sql_query(RELEASE_LOCK_SQL)
                .bind::<diesel::sql_types::Uuid, _>(id.into_inner())
                .bind::<Timestamptz, _>(token.expires_at())
                .execute(connection)?;
            lock_outcome(connection, updated, id)
        })
        .await
    }

    async fn increment_retry(&self, id: RecordId, now: DateTime<Utc>) -> StagingResult<u32> {
        run_blocking(&self.pool, move |connection| {
            let count = diesel::update(staged_records::table.find(id.into_inner()))
                .set((
                    staged_records::retry_count.eq(staged_records::retry_count + 1),
                    staged_records::last_retry_time.eq(Some(now)),
                ))
                .returning(staged_records::retry_count)
                .get_result::<i32>(connection)
                .optional()?
                .ok_or(StagingStoreError::NotFound(id))?;
            u32::try_from(count).map_err(StagingStoreError::invalid_persisted_data)
        })
        .await
    }

    async fn mark_dead_letter(&self, id: RecordId, token: LockToken) -> StagingResult<bool> {
        run_blocking(&self.pool, move |connection| {
            let updated = diesel::update(
                staged_records::table
                    .find(id.into_inner())
                    .filter(staged_records::in_progress_until.eq(token.expires_at())),
            )
            .set((
                staged_records::status.eq(DEAD_LETTER),
                staged_records::in_progress_until.eq(None::<DateTime<Utc>>),
            ))
            .execute(connection)?;
            lock_outcome(connection, updated, id)
        })
        .await
    }

    async fn delete(&self, id: RecordId) -> StagingResult<()> {
        run_blocking(&self.pool, move |connection| {
            connection.transaction::<_, StagingStoreError, _>(|tx| {
                let locked = staged_records::table
                    .find(id.into_inner())
                    .select(staged_records::id)
                    .for_update()
                    .first::<uuid::Uuid>(tx)
                    .optional()?;
                if locked.is_none() {
                    return Err(StagingStoreError::NotFound(id));
                }

                let (total, open) = subscription_tallies(tx, id)?;
                if total == 0 || open > 0 {
                    return Err(StagingStoreError::DeleteRejected {
                        record_id: id,
                        reason: "not every subscription is processed",
                    });
                }

                diesel::delete(staged_records::table.find(id.into_inner())).execute(tx)?;
                Ok(())
            })
        })
        .await
    }

    async fn release_stale_locks(&self, now: DateTime<Utc>) -> StagingResult<u64> {
        run_blocking(&self.pool, move |connection| {
            let released = diesel::update(
                staged_records::table
                    .filter(staged_records::status.eq(IN_PROGRESS))
                    .filter(staged_records::in_progress_until.lt(now)),
            )
            .set((
                staged_records::status.eq(PENDING),
                staged_records::in_progress_until.eq(None::<DateTime<Utc>>),
            ))
            .execute(connection)?;
            Ok(released as u64)
        })
        .await
    }

    async fn promote_exhausted(&self) -> StagingResult<u64> {
        run_blocking(&self.pool, move |connection| {
            let promoted = diesel::update(
                staged_records::table
                    .filter(staged_records::status.ne(DEAD_LETTER))
                    .filter(staged_records::retry_count.gt(staged_records::max_retries)),
            )
            .set((
                staged_records::status.eq(DEAD_LETTER),
                staged_records::in_progress_until.eq(None::<DateTime<Utc>>),
            ))
            .execute(connection)?;
            Ok(promoted as u64)
        })
        .await
    }

    async fn find_unsubscribed(
        &self,
        interface_name: &InterfaceName,
        limit: usize,
    ) -> StagingResult<Vec<StagedRecord>> {
        let interface = interface_name.as_str().to_owned();
        let row_limit = i64::try_from(limit).unwrap_or(i64::MAX);
        run_blocking(&self.pool, move |connection| {
            staged_records::table
                .filter(staged_records::interface_name.eq(&interface))
                .filter(staged_records::subscribed_at.is_null())
                .order((staged_records::created_at.asc(), staged_records::id.asc()))
                .limit(row_limit)
                .select(StagedRecordRow::as_select())
                .load::<StagedRecordRow>(connection)?
                .into_iter()
                .map(row_to_record)
                .collect()
        })
        .await
    }

    async fn purge_orphans(&self, older_than: DateTime<Utc>) -> StagingResult<u64> {
        run_blocking(&self.pool, move |connection| {
            let purged = diesel::sql_query(PURGE_ORPHANS_SQL)
                .bind::<Timestamptz, _>(older_than)
                .execute(connection)?;
            Ok(purged as u64)
        })
        .await
    }

    async fn requeue_dead_letter(&self, id: RecordId, now: DateTime<Utc>) -> StagingResult<()> {
        run_blocking(&self.pool, move |connection| {
            connection.transaction::<_, StagingStoreError, _>(|tx| {
                let row = staged_records::table
                    .find(id.into_inner())
                    .select(StagedRecordRow::as_select())
                    .for_update()
                    .first::<StagedRecordRow>(tx)
                    .optional()?
                    .ok_or(StagingStoreError::NotFound(id))?;
                let mut record = row_to_record(row)?;
                record.requeue()?;

                diesel::update(staged_records::table.find(id.into_inner()))
                    .set((
                        staged_records::status.eq(PENDING),
                        staged_records::retry_count.eq(0),
                        staged_records::in_progress_until.eq(None::<DateTime<Utc>>),
                    ))
                    .execute(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            StagingStoreError::Conflict(id)
                        }
                        other => StagingStoreError::persistence(other),
                    })?;

                diesel::update(
                    subscriptions::table
                        .filter(subscriptions::record_id.eq(id.into_inner()))
                        .filter(subscriptions::status.eq(ERROR)),
                )
                .set((
                    subscriptions::status.eq(PENDING),
                    subscriptions::updated_at.eq(now),
                ))
                .execute(tx)?;
                Ok(())
            })
        })
        .await
    }

    async fn status_counts(&self, interface_name: &InterfaceName) -> StagingResult<StagingCounts> {
        let interface = interface_name.as_str().to_owned();
        run_blocking(&self.pool, move |connection| {
            let by_status = staged_records::table
                .filter(staged_records::interface_name.eq(&interface))
                .group_by(staged_records::status)
                .select((staged_records::status, count_star()))
                .load::<(String, i64)>(connection)?;
            let errors = subscriptions::table
                .filter(subscriptions::interface_name.eq(&interface))
                .filter(subscriptions::status.eq(ERROR))
                .group_by(subscriptions::subscriber_connector_name)
                .select((subscriptions::subscriber_connector_name, count_star()))
                .load::<(String, i64)>(connection)?;

            let mut counts = StagingCounts::default();
            for (status, count) in by_status {
                let tally = to_count(count)?;
                match RecordStatus::try_from(status.as_str())
                    .map_err(StagingStoreError::invalid_persisted_data)?
                {
                    RecordStatus::Pending => counts.pending = tally,
                    RecordStatus::InProgress => counts.in_progress = tally,
                    RecordStatus::DeadLetter => counts.dead_letter = tally,
                }
            }
            for (subscriber, count) in errors {
                let subscriber_name = ConnectorName::new(subscriber)
                    .map_err(StagingStoreError::invalid_persisted_data)?;
                counts
                    .subscriber_errors
                    .insert(subscriber_name, to_count(count)?);
            }
            Ok(counts)
        })
        .await
    }
}

#[async_trait]
impl SubscriptionTracker for PostgresStagingBox {
    async fn create_subscriptions(
        &self,
        record_id: RecordId,
        interface_name: &InterfaceName,
        subscribers: &[ConnectorName],
        now: DateTime<Utc>,
    ) -> SubscriptionResult<usize> {
        let mut new_rows: Vec<NewSubscriptionRow> = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            if new_rows
                .iter()
                .any(|row| row.subscriber_connector_name == subscriber.as_str())
            {
                continue;
            }
            new_rows.push(NewSubscriptionRow {
                id: SubscriptionId::new().into_inner(),
                record_id: record_id.into_inner(),
                interface_name: interface_name.as_str().to_owned(),
                subscriber_connector_name: subscriber.as_str().to_owned(),
                status: PENDING.to_owned(),
                created_at: now,
                updated_at: now,
            });
        }

        run_blocking(&self.pool, move |connection| {
            connection.transaction::<_, SubscriptionError, _>(|tx| {
                let snapshot = staged_records::table
                    .find(record_id.into_inner())
                    .select(staged_records::subscribed_at)
                    .for_update()
                    .first::<Option<DateTime<Utc>>>(tx)
                    .optional()?
                    .ok_or(SubscriptionError::RecordNotFound(record_id))?;
                if snapshot.is_some() {
                    return Ok(0);
                }

                let created = if new_rows.is_empty() {
                    0
                } else {
                    diesel::insert_into(subscriptions::table)
                        .values(&new_rows)
                        .on_conflict_do_nothing()
                        .execute(tx)?
                };
                diesel::update(staged_records::table.find(record_id.into_inner()))
                    .set(staged_records::subscribed_at.eq(Some(now)))
                    .execute(tx)?;
                Ok(created)
            })
        })
        .await
    }

    async fn mark_processed(
        &self,
        record_id: RecordId,
        subscriber: &ConnectorName,
        now: DateTime<Utc>,
    ) -> SubscriptionResult<()> {
        let owner = subscriber.clone();
        run_blocking(&self.pool, move |connection| {
            let updated = diesel::update(
                subscriptions::table
                    .filter(subscriptions::record_id.eq(record_id.into_inner()))
                    .filter(subscriptions::subscriber_connector_name.eq(owner.as_str())),
            )
            .set((
                subscriptions::status.eq(PROCESSED),
                subscriptions::processed_at.eq(Some(now)),
                subscriptions::error_message.eq(None::<String>),
                subscriptions::updated_at.eq(now),
            ))
            .execute(connection)?;
            ensure_subscription_found(updated, record_id, owner)
        })
        .await
    }

    async fn mark_error(
        &self,
        record_id: RecordId,
        subscriber: &ConnectorName,
        message: &str,
        now: DateTime<Utc>,
    ) -> SubscriptionResult<bool> {
        let owner = subscriber.clone();
        let reason = message.to_owned();
        run_blocking(&self.pool, move |connection| {
            let updated = diesel::update(
                subscriptions::table
                    .filter(subscriptions::record_id.eq(record_id.into_inner()))
                    .filter(subscriptions::subscriber_connector_name.eq(owner.as_str()))
                    .filter(subscriptions::status.ne(PROCESSED)),
            )
            .set((
                subscriptions::status.eq(ERROR),
                subscriptions::error_message.eq(Some(reason)),
                subscriptions::updated_at.eq(now),
            ))
            .execute(connection)?;
            if updated > 0 {
                return Ok(true);
            }

            let existing = subscriptions::table
                .filter(subscriptions::record_id.eq(record_id.into_inner()))
                .filter(subscriptions::subscriber_connector_name.eq(owner.as_str()))
                .select(subscriptions::id)
                .first::<uuid::Uuid>(connection)
                .optional()?;
            match existing {
                Some(_) => Ok(false),
                None => Err(SubscriptionError::NotFound {
                    record_id,
                    subscriber: owner,
                }),
            }
        })
        .await
    }

    async fn all_processed(&self, record_id: RecordId) -> SubscriptionResult<bool> {
        run_blocking(&self.pool, move |connection| {
            let (total, open) = subscription_tallies(connection, record_id)?;
            Ok(total > 0 && open == 0)
        })
        .await
    }

    async fn list_for_record(&self, record_id: RecordId) -> SubscriptionResult<Vec<Subscription>> {
        run_blocking(&self.pool, move |connection| {
            subscriptions::table
                .filter(subscriptions::record_id.eq(record_id.into_inner()))
                .order(subscriptions::subscriber_connector_name.asc())
                .select(SubscriptionRow::as_select())
                .load::<SubscriptionRow>(connection)?
                .into_iter()
                .map(row_to_subscription)
                .collect()
        })
        .await
    }
}

/// Counts all and not-yet-processed subscriptions of a record.
fn subscription_tallies(
    connection: &mut PgConnection,
    record_id: RecordId,
) -> Result<(i64, i64), DieselError> {
    let total = subscriptions::table
        .filter(subscriptions::record_id.eq(record_id.into_inner()))
        .count()
        .get_result::<i64>(connection)?;
    let open = subscriptions::table
        .filter(subscriptions::record_id.eq(record_id.into_inner()))
        .filter(subscriptions::status.ne(PROCESSED))
        .count()
        .get_result::<i64>(connection)?;
    Ok((total, open))
}

/// Maps a token-guarded update to its outcome: `true` when applied,
/// `false` when the record exists under another lock, `NotFound` otherwise.
fn lock_outcome(
    connection: &mut PgConnection,
    updated: usize,
    id: RecordId,
) -> StagingResult<bool> {
    if updated > 0 {
        return Ok(true);
    }
    let exists = staged_records::table
        .find(id.into_inner())
        .select(staged_records::id)
        .first::<uuid::Uuid>(connection)
        .optional()?;
    exists.map(|_| false).ok_or(StagingStoreError::NotFound(id))
}

fn ensure_subscription_found(
    updated: usize,
    record_id: RecordId,
    subscriber: ConnectorName,
) -> SubscriptionResult<()> {
    if updated == 0 {
        return Err(SubscriptionError::NotFound {
            record_id,
            subscriber,
        });
    }
    Ok(())
}

fn to_count(value: i64) -> StagingResult<u64> {
    u64::try_from(value).map_err(StagingStoreError::invalid_persisted_data)
}

fn to_new_row(record: &StagedRecord) -> StagingResult<NewStagedRecordRow> {
    let payload =
        serde_json::to_value(record.payload()).map_err(StagingStoreError::persistence)?;
    let retry_count =
        i32::try_from(record.retry_count()).map_err(StagingStoreError::persistence)?;
    let max_retries =
        i32::try_from(record.max_retries()).map_err(StagingStoreError::persistence)?;

    Ok(NewStagedRecordRow {
        id: record.id().into_inner(),
        interface_name: record.interface_name().as_str().to_owned(),
        source_connector_name: record.source_connector_name().as_str().to_owned(),
        source_connector_kind: record.source_connector_kind().as_str().to_owned(),
        payload,
        content_hash: record.content_hash().as_str().to_owned(),
        status: record.status().as_str().to_owned(),
        retry_count,
        max_retries,
        created_at: record.created_at(),
    })
}

fn row_to_record(row: StagedRecordRow) -> StagingResult<StagedRecord> {
    let StagedRecordRow {
        id,
        interface_name,
        source_connector_name,
        source_connector_kind,
        payload,
        content_hash,
        status,
        retry_count,
        max_retries,
        in_progress_until,
        last_retry_time,
        subscribed_at,
        created_at,
    } = row;

    let data = PersistedRecordData {
        id: RecordId::from_uuid(id),
        interface_name: InterfaceName::new(interface_name)
            .map_err(StagingStoreError::invalid_persisted_data)?,
        source_connector_name: ConnectorName::new(source_connector_name)
            .map_err(StagingStoreError::invalid_persisted_data)?,
        source_connector_kind: ConnectorKind::new(source_connector_kind)
            .map_err(StagingStoreError::invalid_persisted_data)?,
        payload: serde_json::from_value::<Payload>(payload)
            .map_err(StagingStoreError::invalid_persisted_data)?,
        content_hash: ContentHash::from_persisted(content_hash),
        status: RecordStatus::try_from(status.as_str())
            .map_err(StagingStoreError::invalid_persisted_data)?,
        retry_count: u32::try_from(retry_count)
            .map_err(StagingStoreError::invalid_persisted_data)?,
        max_retries: u32::try_from(max_retries)
            .map_err(StagingStoreError::invalid_persisted_data)?,
        in_progress_until,
        last_retry_time,
        subscribed_at,
        created_at,
    };
    Ok(StagedRecord::from_persisted(data))
}

fn row_to_subscription(row: SubscriptionRow) -> SubscriptionResult<Subscription> {
    let data = PersistedSubscriptionData {
        id: SubscriptionId::from_uuid(row.id),
        record_id: RecordId::from_uuid(row.record_id),
        interface_name: InterfaceName::new(row.interface_name)
            .map_err(SubscriptionError::invalid_persisted_data)?,
        subscriber: ConnectorName::new(row.subscriber_connector_name)
            .map_err(SubscriptionError::invalid_persisted_data)?,
        status: SubscriptionStatus::try_from(row.status.as_str())
            .map_err(SubscriptionError::invalid_persisted_data)?,
        processed_at: row.processed_at,
        error_message: row.error_message,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };
    Ok(Subscription::from_persisted(data))
}
