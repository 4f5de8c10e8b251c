//! In-memory staging adapter for tests and single-process embedding.

mod staging_box;

pub use staging_box::InMemoryStagingBox;
