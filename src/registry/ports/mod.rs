//! Port contracts for the instance registry.

pub mod registry;

pub use registry::{InstanceRegistry, RegistryError, RegistryResult};
