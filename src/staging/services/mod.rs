//! Pure staging services.

mod debatch;

pub use debatch::{Debatch, debatch};
