//! Runs the lock/retry supervisor against a `PostgreSQL` Box.
//!
//! Usage:
//!
//! ```text
//! stagebox_supervisor <config-path>
//! ```
//!
//! The JSON file at `config-path` must deserialize into a
//! [`DeliveryConfig`]. A representative file is:
//!
//! ```json
//! {
//!   "database_url": "postgres://stagebox@localhost/stagebox",
//!   "lock_duration_secs": 300,
//!   "max_retries": 5,
//!   "sweep_interval_secs": 60,
//!   "orphan_ttl_secs": 86400
//! }
//! ```
//!
//! The process sweeps until it receives Ctrl-C. Log verbosity follows
//! `RUST_LOG` and defaults to `info`.

use camino::Utf8PathBuf;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use stagebox::config::{ConfigError, DeliveryConfig};
use stagebox::delivery::services::{LockRetrySupervisor, run_supervisor_loop};
use stagebox::staging::adapters::postgres::PostgresStagingBox;
use std::env;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Errors that stop the supervisor before it starts sweeping.
#[derive(Debug, Error)]
enum SupervisorStartError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build connection pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] std::io::Error),
}

fn main() -> Result<(), SupervisorStartError> {
    install_tracing();
    let config_path = parse_args(env::args_os())?;
    let config = DeliveryConfig::load(&config_path)?;

    let manager = ConnectionManager::<PgConnection>::new(config.database_url.as_str());
    let pool = Pool::builder().max_size(config.pool_size).build(manager)?;
    let store = Arc::new(PostgresStagingBox::new(pool));
    let supervisor = LockRetrySupervisor::new(store).with_orphan_ttl(config.orphan_ttl());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(SupervisorStartError::RuntimeInit)?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for Ctrl-C");
            }
            shutdown.cancel();
        });

        info!(
            period_secs = config.sweep_interval_secs,
            orphan_ttl_secs = ?config.orphan_ttl_secs,
            "supervisor started"
        );
        run_supervisor_loop(&supervisor, &DefaultClock, config.sweep_interval(), &cancel).await;
    });
    Ok(())
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_args(
    mut args: impl Iterator<Item = std::ffi::OsString>,
) -> Result<Utf8PathBuf, SupervisorStartError> {
    let _program = args.next();
    let config_path = args
        .next()
        .ok_or_else(|| SupervisorStartError::InvalidArgs("missing config path argument".into()))?
        .into_string()
        .map(Utf8PathBuf::from)
        .map_err(|_| SupervisorStartError::InvalidArgs("config path is not valid UTF-8".into()))?;
    if let Some(extra) = args.next() {
        let extra_arg = extra.to_string_lossy();
        return Err(SupervisorStartError::InvalidArgs(format!(
            "unexpected extra argument: {extra_arg}"
        )));
    }
    Ok(config_path)
}
