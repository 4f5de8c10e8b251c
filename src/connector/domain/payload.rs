//! Record payloads and the schema descriptors that type them.

use super::ParseFieldTypeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Type a connector declares for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text.
    Text,
    /// Whole number.
    Integer,
    /// Number with a fractional part.
    Decimal,
    /// True or false.
    Boolean,
    /// Point in time.
    Timestamp,
    /// Arbitrary JSON, also used when the schema does not describe a field.
    Json,
}

impl FieldType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for FieldType {
    type Error = ParseFieldTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "text" => Ok(Self::Text),
            "integer" => Ok(Self::Integer),
            "decimal" => Ok(Self::Decimal),
            "boolean" => Ok(Self::Boolean),
            "timestamp" => Ok(Self::Timestamp),
            "json" => Ok(Self::Json),
            _ => Err(ParseFieldTypeError(value.to_owned())),
        }
    }
}

/// A named field with its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name as the connector reports it.
    pub name: String,
    /// Declared field type.
    pub field_type: FieldType,
}

impl FieldDescriptor {
    /// Creates a field descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// One named value inside a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    /// Field name.
    pub name: String,
    /// Declared field type.
    pub field_type: FieldType,
    /// Field value.
    pub value: Value,
}

/// Ordered set of named, typed values making up one record.
///
/// The staging core never interprets field semantics. Order is part of the
/// payload identity: two payloads with the same fields in a different order
/// hash differently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<FieldValue>);

impl Payload {
    /// Creates an empty payload.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a field, keeping insertion order.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType, value: Value) -> Self {
        self.push(name, field_type, value);
        self
    }

    /// Appends a field, keeping insertion order.
    pub fn push(&mut self, name: impl Into<String>, field_type: FieldType, value: Value) {
        self.0.push(FieldValue {
            name: name.into(),
            field_type,
            value,
        });
    }

    /// Returns the value of the first field with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Returns the fields in order.
    #[must_use]
    pub fn fields(&self) -> &[FieldValue] {
        &self.0
    }

    /// Returns the field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|field| field.name.as_str())
    }

    /// Returns the field count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the payload has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<FieldValue> for Payload {
    fn from_iter<I: IntoIterator<Item = FieldValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
