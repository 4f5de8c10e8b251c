//! `PostgreSQL` adapters for the staging store and subscription tracker.

mod blocking;
mod models;
mod repository;
mod schema;

pub use blocking::StagingPgPool;
pub use repository::PostgresStagingBox;
