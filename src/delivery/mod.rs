//! Delivery orchestration between connectors and the Box.
//!
//! Source instances stage debatched records and snapshot their subscribers;
//! destination instances claim, write and acknowledge them; the supervisor
//! recovers stale locks and parks records that keep failing. All
//! coordination happens through the staging ports, so any number of
//! processes may run these services side by side.
//!
//! - Reports and settings in [`domain`]
//! - Coordinator, supervisor and worker loops in [`services`]

pub mod domain;
pub mod services;

#[cfg(test)]
mod tests;
