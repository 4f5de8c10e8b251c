//! Capability contract implemented by every source and destination connector.

use crate::connector::domain::{FieldDescriptor, Payload, PollState, RawBatch};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for connector operations other than `write`.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Capability set shared by all connector kinds.
///
/// Destination writes must be idempotent: a record can be delivered more
/// than once when a lock expires while a slow write is still running.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Reads the next batch starting from `poll_state`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the external system cannot be read.
    async fn read(&self, poll_state: &PollState) -> ConnectorResult<RawBatch>;

    /// Writes a single record payload to the external system.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] describing the failure and whether retrying
    /// can help.
    async fn write(&self, payload: &Payload) -> Result<(), WriteError>;

    /// Describes the fields this connector produces or accepts, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the schema cannot be determined.
    async fn describe_schema(&self) -> ConnectorResult<Vec<FieldDescriptor>>;

    /// Prepares the destination to receive records with the given fields,
    /// for example by creating a table or a directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the destination cannot be prepared.
    async fn ensure_destination_ready(&self, fields: &[FieldDescriptor]) -> ConnectorResult<()>;
}

/// Errors from connector reads and schema operations.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// The connector does not support the requested capability.
    #[error("connector does not support {0}")]
    Unsupported(&'static str),

    /// The external system failed.
    #[error("external system error: {0}")]
    External(Arc<dyn std::error::Error + Send + Sync>),
}

impl ConnectorError {
    /// Wraps an external system error.
    pub fn external(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::External(Arc::new(err))
    }
}

/// Failure reported by [`Connector::write`].
///
/// Failures are retryable unless the connector says otherwise. A
/// non-retryable failure sends the record straight to dead-letter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WriteError {
    message: String,
    retryable: bool,
}

impl WriteError {
    /// Creates a retryable failure, such as a timeout.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a failure retrying cannot fix, such as a rejected payload.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` when another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }
}
