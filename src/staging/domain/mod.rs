//! Domain model for staged records and their subscriptions.
//!
//! Records own their subscriptions: a subscription only refers to its
//! record by identifier, and deleting a record removes its subscriptions.

mod counts;
mod error;
mod hash;
mod ids;
mod lock;
mod record;
mod status;
mod subscription;

pub use counts::StagingCounts;
pub use error::{ParseStatusError, StagingDomainError};
pub use hash::ContentHash;
pub use ids::{RecordId, SubscriptionId};
pub use lock::LockToken;
pub use record::{NewStagedRecord, PersistedRecordData, StageOutcome, StagedRecord};
pub use status::{RecordStatus, SubscriptionStatus};
pub use subscription::{PersistedSubscriptionData, Subscription};
