//! Blocking operation helpers for the `PostgreSQL` staging adapter.
//!
//! Diesel is synchronous, so every call is moved onto Tokio's blocking
//! thread pool together with a pooled connection.

use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

use crate::staging::ports::{StagingStoreError, SubscriptionError};

/// `PostgreSQL` connection pool type used by staging adapters.
pub type StagingPgPool = Pool<ConnectionManager<PgConnection>>;

/// Error types that can wrap connection and join failures.
pub(super) trait PersistenceFailure: Send + 'static {
    fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self;
}

impl PersistenceFailure for StagingStoreError {
    fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::persistence(err)
    }
}

impl PersistenceFailure for SubscriptionError {
    fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::persistence(err)
    }
}

impl From<diesel::result::Error> for StagingStoreError {
    fn from(err: diesel::result::Error) -> Self {
        Self::persistence(err)
    }
}

impl From<diesel::result::Error> for SubscriptionError {
    fn from(err: diesel::result::Error) -> Self {
        Self::persistence(err)
    }
}

/// Runs `f` with a pooled connection on the blocking thread pool.
pub(super) async fn run_blocking<F, T, E>(pool: &StagingPgPool, f: F) -> Result<T, E>
where
    F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: PersistenceFailure,
{
    let shared = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut connection = shared.get().map_err(E::persistence)?;
        f(&mut connection)
    })
    .await
    .map_err(E::persistence)?
}
