//! Step definitions for guaranteed delivery scenarios.

pub mod world;
