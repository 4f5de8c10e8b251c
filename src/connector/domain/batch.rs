//! Batch reads produced by source connectors.

use super::FieldDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque cursor a source connector uses to resume reading.
///
/// The staging loop only advances to [`RawBatch::next_state`] after the
/// whole batch has been staged, so a failed cycle re-reads the same batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState(Option<String>);

impl PollState {
    /// State for a connector that has not read anything yet.
    #[must_use]
    pub const fn initial() -> Self {
        Self(None)
    }

    /// State positioned at the given cursor.
    #[must_use]
    pub fn at(cursor: impl Into<String>) -> Self {
        Self(Some(cursor.into()))
    }

    /// Returns the cursor, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// One row of a batch read, as ordered `(name, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow(Vec<(String, Value)>);

impl RawRow {
    /// Creates an empty row.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a column value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.0.push((name.into(), value));
        self
    }

    /// Consumes the row into its ordered columns.
    #[must_use]
    pub fn into_columns(self) -> Vec<(String, Value)> {
        self.0
    }
}

impl FromIterator<(String, Value)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A multi-record read from a source connector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBatch {
    schema: Vec<FieldDescriptor>,
    rows: Vec<RawRow>,
    next_state: PollState,
}

impl RawBatch {
    /// Creates a batch from its schema, rows and follow-up poll state.
    #[must_use]
    pub const fn new(schema: Vec<FieldDescriptor>, rows: Vec<RawRow>, next_state: PollState) -> Self {
        Self {
            schema,
            rows,
            next_state,
        }
    }

    /// Returns the schema describing the rows.
    #[must_use]
    pub fn schema(&self) -> &[FieldDescriptor] {
        &self.schema
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when the batch has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the poll state to use after this batch is staged.
    #[must_use]
    pub const fn next_state(&self) -> &PollState {
        &self.next_state
    }

    /// Splits the batch into schema, rows and next poll state.
    #[must_use]
    pub fn into_parts(self) -> (Vec<FieldDescriptor>, Vec<RawRow>, PollState) {
        (self.schema, self.rows, self.next_state)
    }
}
