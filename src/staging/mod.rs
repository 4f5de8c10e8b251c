//! The staging store ("the Box") and its subscription tracker.
//!
//! Source records are staged here, one row per record, together with one
//! subscription per destination that must receive them. A record is only
//! removed once every subscription reports it processed. The module
//! follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Pure staging services (debatching) in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
