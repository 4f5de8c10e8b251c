//! Value types produced and consumed by delivery services.

mod report;
mod settings;

pub use report::{DeliveryReport, StageReport, SweepReport};
pub use settings::DeliverySettings;
