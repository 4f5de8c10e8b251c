//! Stagebox: guaranteed delivery of connector records through a shared
//! staging store.
//!
//! Source connectors read multi-record batches. Each batch is split into
//! single-record payloads, staged in the Box with a content hash for
//! idempotency, and snapshotted against the destinations enabled on the
//! interface at that moment. Destination workers claim records under a
//! time-bounded lock, write them, and acknowledge per subscriber. A record
//! is deleted only once every subscriber has processed it.
//!
//! # Architecture
//!
//! Stagebox follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//!
//! # Modules
//!
//! - [`connector`]: Connector contract, record payloads and poll state
//! - [`staging`]: The Box, subscriptions and debatching
//! - [`registry`]: Connector instances and their roles per interface
//! - [`delivery`]: Staging, delivery and supervision services
//! - [`config`]: File-based runtime configuration

pub mod config;
pub mod connector;
pub mod delivery;
pub mod registry;
pub mod staging;
