//! Connector capability contract.
//!
//! Every source and destination connector exposes the same four
//! capabilities: reading a batch, writing a single record, describing its
//! schema, and preparing a destination for a schema. The staging core only
//! talks to connectors through [`ports::Connector`], so adding a connector
//! kind never touches the store or the delivery services.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
