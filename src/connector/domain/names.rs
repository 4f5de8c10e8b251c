//! Validated name types identifying interfaces and connectors.

use super::NameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest name accepted by the `VARCHAR(255)` columns.
const MAX_NAME_LENGTH: usize = 255;

fn validate(kind: &'static str, value: String) -> Result<String, NameError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty { kind });
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(NameError::TooLong {
            kind,
            value,
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(trimmed.to_owned())
}

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a validated name.
            ///
            /// # Errors
            ///
            /// Returns [`NameError`] when the trimmed value is empty or
            /// longer than 255 characters.
            pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
                validate($kind, value.into()).map(Self)
            }

            /// Returns the name as `str`.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = NameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

validated_name!(
    /// Name of a configured route that connects sources to destinations.
    InterfaceName,
    "interface name"
);

validated_name!(
    /// Name of a configured connector instance.
    ///
    /// Destination instance names double as subscriber names on
    /// subscriptions.
    ConnectorName,
    "connector name"
);

validated_name!(
    /// Connector type, such as `csv` or `sftp`.
    ConnectorKind,
    "connector kind"
);
