//! Application services for staging and delivery.

mod coordinator;
mod runner;
mod supervisor;

pub use coordinator::{DeliveryCoordinator, DeliveryError, DeliveryResult, prepare_destination};
pub use runner::{run_destination_loop, run_source_cycle, run_source_loop, run_supervisor_loop};
pub use supervisor::{LockRetrySupervisor, SupervisorError, SupervisorResult};
