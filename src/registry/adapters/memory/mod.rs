//! In-memory registry for tests and embedding callers.

mod registry;

pub use registry::InMemoryInstanceRegistry;
