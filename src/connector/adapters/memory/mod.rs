//! In-memory connector used by tests and embedding callers.

mod connector;

pub use connector::InMemoryConnector;
