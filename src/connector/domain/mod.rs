//! Domain model shared by connectors and the staging core.
//!
//! Payloads are opaque to the core: an ordered list of named values, each
//! tagged with the type the producing connector declared for it.

mod batch;
mod error;
mod names;
mod payload;

pub use batch::{PollState, RawBatch, RawRow};
pub use error::{NameError, ParseFieldTypeError};
pub use names::{ConnectorKind, ConnectorName, InterfaceName};
pub use payload::{FieldDescriptor, FieldType, FieldValue, Payload};
