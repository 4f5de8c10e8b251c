//! Tunables for delivery cycles.

use crate::config::DeliveryConfig;
use chrono::TimeDelta;
use std::time::Duration;

/// Claim, retry and polling settings applied by the delivery coordinator
/// and its worker loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    /// Records claimed per destination cycle.
    pub batch_size: usize,
    /// How long a claim locks a record.
    pub lock_duration: TimeDelta,
    /// Retry limit stamped on newly staged records.
    pub max_retries: u32,
    /// Pause between source and destination cycles.
    pub poll_interval: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            lock_duration: TimeDelta::minutes(5),
            max_retries: 5,
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl From<&DeliveryConfig> for DeliverySettings {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            lock_duration: config.lock_duration(),
            max_retries: config.max_retries,
            poll_interval: config.poll_interval(),
        }
    }
}
