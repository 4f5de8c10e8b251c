//! Port contracts for the staging store and subscription tracker.
//!
//! Ports define infrastructure-agnostic interfaces used by delivery
//! services. Implementations must make `claim_batch` and `increment_retry`
//! atomic across processes.

pub mod store;
pub mod subscriptions;

pub use store::{ClaimRequest, StagingResult, StagingStore, StagingStoreError};
pub use subscriptions::{SubscriptionError, SubscriptionResult, SubscriptionTracker};
