//! Adapter implementations for staging ports.

pub mod memory;
pub mod postgres;
