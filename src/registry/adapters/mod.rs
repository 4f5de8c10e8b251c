//! Adapter implementations for the registry port.

pub mod memory;
pub mod postgres;
