//! Port contracts for connectors.
//!
//! Ports define the capability set the staging core consumes.

pub mod connector;

pub use connector::{Connector, ConnectorError, ConnectorResult, WriteError};
