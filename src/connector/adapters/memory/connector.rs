//! Thread-safe in-memory connector acting as both source and destination.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::connector::{
    domain::{FieldDescriptor, Payload, PollState, RawBatch, RawRow},
    ports::{Connector, ConnectorError, ConnectorResult, WriteError},
};

/// In-memory connector.
///
/// As a source it serves `rows` in pages of `page_size`, using the row
/// offset as poll cursor. As a destination it records every successful
/// write and replays queued failures first.
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    schema: Vec<FieldDescriptor>,
    page_size: usize,
    state: Arc<RwLock<InMemoryConnectorState>>,
}

#[derive(Debug, Default)]
struct InMemoryConnectorState {
    rows: Vec<RawRow>,
    written: Vec<Payload>,
    attempts: usize,
    scripted_failures: VecDeque<WriteError>,
    prepared_fields: Option<Vec<FieldDescriptor>>,
}

fn poisoned(err: impl ToString) -> ConnectorError {
    ConnectorError::external(std::io::Error::other(err.to_string()))
}

impl InMemoryConnector {
    /// Creates a connector describing the given schema.
    #[must_use]
    pub fn new(schema: Vec<FieldDescriptor>) -> Self {
        Self {
            schema,
            page_size: usize::MAX,
            state: Arc::default(),
        }
    }

    /// Limits how many rows a single `read` returns.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Adds rows that later `read` calls will serve.
    pub fn push_rows(&self, rows: impl IntoIterator<Item = RawRow>) {
        if let Ok(mut state) = self.state.write() {
            state.rows.extend(rows);
        }
    }

    /// Makes the next `write` calls fail with the given errors, in order.
    pub fn fail_next_writes(&self, failures: impl IntoIterator<Item = WriteError>) {
        if let Ok(mut state) = self.state.write() {
            state.scripted_failures.extend(failures);
        }
    }

    /// Returns the payloads written successfully so far.
    #[must_use]
    pub fn written(&self) -> Vec<Payload> {
        self.state
            .read()
            .map(|state| state.written.clone())
            .unwrap_or_default()
    }

    /// Returns how many writes were attempted, failed ones included.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.state.read().map(|state| state.attempts).unwrap_or_default()
    }

    /// Returns the fields passed to the last `ensure_destination_ready`.
    #[must_use]
    pub fn prepared_fields(&self) -> Option<Vec<FieldDescriptor>> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.prepared_fields.clone())
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn read(&self, poll_state: &PollState) -> ConnectorResult<RawBatch> {
        let offset = match poll_state.cursor() {
            Some(cursor) => cursor.parse::<usize>().map_err(ConnectorError::external)?,
            None => 0,
        };
        let state = self.state.read().map_err(poisoned)?;
        let page: Vec<RawRow> = state
            .rows
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        let next_offset = offset.saturating_add(page.len());
        Ok(RawBatch::new(
            self.schema.clone(),
            page,
            PollState::at(next_offset.to_string()),
        ))
    }

    async fn write(&self, payload: &Payload) -> Result<(), WriteError> {
        let mut state = self
            .state
            .write()
            .map_err(|err| WriteError::retryable(err.to_string()))?;
        state.attempts = state.attempts.saturating_add(1);
        if let Some(failure) = state.scripted_failures.pop_front() {
            return Err(failure);
        }
        state.written.push(payload.clone());
        Ok(())
    }

    async fn describe_schema(&self) -> ConnectorResult<Vec<FieldDescriptor>> {
        Ok(self.schema.clone())
    }

    async fn ensure_destination_ready(&self, fields: &[FieldDescriptor]) -> ConnectorResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.prepared_fields = Some(fields.to_vec());
        Ok(())
    }
}
