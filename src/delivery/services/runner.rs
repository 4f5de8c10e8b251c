//! Interval-driven worker loops for sources, destinations and the
//! supervisor.
//!
//! Each loop owns no state beyond its poll cursor; everything else lives in
//! the Box. A failed cycle is logged and retried on the next tick. Loops
//! stop when their cancellation token fires, finishing the current record
//! first.

use super::{DeliveryCoordinator, DeliveryResult, LockRetrySupervisor};
use crate::connector::{domain::PollState, ports::Connector};
use crate::delivery::domain::StageReport;
use crate::registry::{domain::ConnectorInstance, ports::InstanceRegistry};
use crate::staging::ports::{StagingStore, SubscriptionTracker};
use mockable::Clock;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Runs one source cycle: repairs stranded records, reads a batch from
/// `state` and stages it.
///
/// Returns the poll state to use next. It only advances when the whole
/// batch was staged, so a cancelled or failed batch is read again.
///
/// # Errors
///
/// Returns [`super::DeliveryError`] when the connector, registry or store
/// fails.
pub async fn run_source_cycle<S, T, R, C>(
    coordinator: &DeliveryCoordinator<S, T, R, C>,
    source: &ConnectorInstance,
    connector: &dyn Connector,
    state: &PollState,
    cancel: &CancellationToken,
) -> DeliveryResult<(PollState, StageReport)>
where
    S: StagingStore,
    T: SubscriptionTracker,
    R: InstanceRegistry,
    C: Clock + Send + Sync,
{
    coordinator
        .repair_unsubscribed(source.interface_name(), coordinator.settings().batch_size)
        .await?;
    let batch = connector.read(state).await?;
    let advanced = batch.next_state().clone();
    let report = coordinator.stage_batch(source, batch, cancel).await?;
    let next = if report.cancelled {
        state.clone()
    } else {
        advanced
    };
    Ok((next, report))
}

/// Polls `connector` every configured poll interval and stages what it
/// reads until `cancel` fires. Returns the last committed poll state.
pub async fn run_source_loop<S, T, R, C>(
    coordinator: &DeliveryCoordinator<S, T, R, C>,
    source: &ConnectorInstance,
    connector: &dyn Connector,
    initial: PollState,
    cancel: &CancellationToken,
) -> PollState
where
    S: StagingStore,
    T: SubscriptionTracker,
    R: InstanceRegistry,
    C: Clock + Send + Sync,
{
    let mut state = initial;
    let mut ticker = fixed_interval(coordinator.settings().poll_interval);
    while next_tick(&mut ticker, cancel).await {
        match run_source_cycle(coordinator, source, connector, &state, cancel).await {
            Ok((next, _)) => state = next,
            Err(err) => error!(
                interface = %source.interface_name(),
                source = %source.instance_name(),
                error = %err,
                "source cycle aborted"
            ),
        }
    }
    info!(source = %source.instance_name(), "source loop stopped");
    state
}

/// Delivers claimed records to `connector` every configured poll interval
/// until `cancel` fires.
pub async fn run_destination_loop<S, T, R, C>(
    coordinator: &DeliveryCoordinator<S, T, R, C>,
    destination: &ConnectorInstance,
    connector: &dyn Connector,
    cancel: &CancellationToken,
) where
    S: StagingStore,
    T: SubscriptionTracker,
    R: InstanceRegistry,
    C: Clock + Send + Sync,
{
    let mut ticker = fixed_interval(coordinator.settings().poll_interval);
    while next_tick(&mut ticker, cancel).await {
        if let Err(err) = coordinator.deliver_batch(destination, connector, cancel).await {
            error!(
                interface = %destination.interface_name(),
                subscriber = %destination.instance_name(),
                error = %err,
                "delivery cycle aborted"
            );
        }
    }
    info!(subscriber = %destination.instance_name(), "destination loop stopped");
}

/// Sweeps every `period` until `cancel` fires.
pub async fn run_supervisor_loop<S, C>(
    supervisor: &LockRetrySupervisor<S>,
    clock: &C,
    period: Duration,
    cancel: &CancellationToken,
) where
    S: StagingStore,
    C: Clock + Send + Sync,
{
    let mut ticker = fixed_interval(period);
    while next_tick(&mut ticker, cancel).await {
        if let Err(err) = supervisor.sweep(clock.utc()).await {
            error!(error = %err, "supervisor sweep aborted");
        }
    }
    info!("supervisor loop stopped");
}

fn fixed_interval(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Waits for the next tick. Returns `false` once `cancel` has fired.
async fn next_tick(ticker: &mut Interval, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        _ = ticker.tick() => true,
    }
}
