//! Content hashing for idempotent staging.

use crate::connector::domain::{InterfaceName, Payload};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of an interface name and a payload, hex encoded.
///
/// Each part is length-prefixed so that shifting bytes between a field name
/// and its value cannot produce the same digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Computes the hash of `payload` staged on `interface_name`.
    #[must_use]
    pub fn compute(interface_name: &InterfaceName, payload: &Payload) -> Self {
        let mut hasher = Sha256::new();
        update_part(&mut hasher, interface_name.as_str());
        for field in payload.fields() {
            update_part(&mut hasher, &field.name);
            update_part(&mut hasher, field.field_type.as_str());
            update_part(&mut hasher, &field.value.to_string());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wraps a hash loaded from persistence.
    #[must_use]
    pub fn from_persisted(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn update_part(hasher: &mut Sha256, part: &str) {
    hasher.update(part.len().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(part.as_bytes());
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
