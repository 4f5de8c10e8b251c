//! Splits connector batch reads into individual record payloads.

use crate::connector::domain::{
    ConnectorName, FieldType, InterfaceName, Payload, RawBatch, RawRow,
};
use std::collections::HashMap;
use std::iter::FusedIterator;
use std::vec;

/// Lazy, single-pass sequence of payloads taken from one batch.
///
/// Each row becomes exactly one payload with its column order kept. Values
/// take the declared type of the matching schema field, or
/// [`FieldType::Json`] when the schema does not describe the column.
#[derive(Debug)]
pub struct Debatch {
    interface_name: InterfaceName,
    source_connector_name: ConnectorName,
    declared_types: HashMap<String, FieldType>,
    rows: vec::IntoIter<RawRow>,
}

/// Debatches `batch`, read by `source_connector_name` for `interface_name`.
#[must_use]
pub fn debatch(
    interface_name: &InterfaceName,
    source_connector_name: &ConnectorName,
    batch: RawBatch,
) -> Debatch {
    let (schema, rows, _) = batch.into_parts();
    let declared_types = schema
        .into_iter()
        .map(|field| (field.name, field.field_type))
        .collect();

    Debatch {
        interface_name: interface_name.clone(),
        source_connector_name: source_connector_name.clone(),
        declared_types,
        rows: rows.into_iter(),
    }
}

impl Debatch {
    /// Returns the interface the payloads belong to.
    #[must_use]
    pub const fn interface_name(&self) -> &InterfaceName {
        &self.interface_name
    }

    /// Returns the source instance that produced the batch.
    #[must_use]
    pub const fn source_connector_name(&self) -> &ConnectorName {
        &self.source_connector_name
    }

    fn to_payload(&self, row: RawRow) -> Payload {
        let mut payload = Payload::new();
        for (name, value) in row.into_columns() {
            let field_type = self
                .declared_types
                .get(&name)
                .copied()
                .unwrap_or(FieldType::Json);
            payload.push(name, field_type, value);
        }
        payload
    }
}

impl Iterator for Debatch {
    type Item = Payload;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(self.to_payload(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Debatch {}

impl FusedIterator for Debatch {}
