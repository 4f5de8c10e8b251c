//! Instance registry: which connector instances exist, in which role, on
//! which interface.
//!
//! The staging core only reads the registry. Subscriptions are derived from
//! the enabled destinations of an interface at staging time; disabling a
//! destination later does not touch records already subscribed.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
