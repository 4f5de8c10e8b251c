//! Delivery configuration loaded from a JSON file.
//!
//! A representative file:
//!
//! ```json
//! {
//!   "database_url": "postgres://stagebox@localhost/stagebox",
//!   "batch_size": 100,
//!   "lock_duration_secs": 300,
//!   "max_retries": 5,
//!   "poll_interval_secs": 10,
//!   "sweep_interval_secs": 60,
//!   "orphan_ttl_secs": 86400,
//!   "pool_size": 8
//! }
//! ```
//!
//! Only `database_url` is required.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_LOCK_DURATION_SECS: u64 = 300;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_POOL_SIZE: u32 = 8;

/// Largest duration accepted for any `*_secs` setting (one year).
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`DeliveryConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A setting holds an unusable value.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending setting.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Settings shared by the delivery loops and the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Records claimed per destination cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seconds a claim locks a record. Must exceed worst-case write latency.
    #[serde(default = "default_lock_duration_secs")]
    pub lock_duration_secs: u64,
    /// Failed deliveries tolerated before a record is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between source and destination cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Seconds between supervisor sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Age after which zero-subscriber records are purged. Unset keeps them.
    #[serde(default)]
    pub orphan_ttl_secs: Option<u64>,
    /// Maximum pooled database connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

const fn default_lock_duration_secs() -> u64 {
    DEFAULT_LOCK_DURATION_SECS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

const fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

impl DeliveryConfig {
    /// Creates a configuration with defaults for everything but the
    /// database URL.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            lock_duration_secs: DEFAULT_LOCK_DURATION_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            orphan_ttl_secs: None,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Reads, parses and validates the JSON file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be opened,
    /// [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = read_config_file(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(invalid("database_url", "must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than zero"));
        }
        if self.pool_size == 0 {
            return Err(invalid("pool_size", "must be greater than zero"));
        }
        check_duration("lock_duration_secs", self.lock_duration_secs)?;
        check_duration("poll_interval_secs", self.poll_interval_secs)?;
        check_duration("sweep_interval_secs", self.sweep_interval_secs)?;
        if let Some(ttl) = self.orphan_ttl_secs {
            check_duration("orphan_ttl_secs", ttl)?;
        }
        Ok(())
    }

    /// Returns the claim lock duration.
    #[must_use]
    pub fn lock_duration(&self) -> TimeDelta {
        seconds(self.lock_duration_secs)
    }

    /// Returns the orphan purge age, when configured.
    #[must_use]
    pub fn orphan_ttl(&self) -> Option<TimeDelta> {
        self.orphan_ttl_secs.map(seconds)
    }

    /// Returns the interval between source and destination cycles.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the interval between supervisor sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

const fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

const fn check_duration(field: &'static str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    if secs > MAX_DURATION_SECS {
        return Err(invalid(field, "must not exceed one year"));
    }
    Ok(())
}

fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

fn read_config_file(path: &Utf8Path) -> Result<String, std::io::Error> {
    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::other("config path must include a file name"))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read_to_string(file_name)
}
