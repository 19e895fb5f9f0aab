//! Sync domain models and classification shared across workers.

mod cadence;
mod classify;
mod model;

pub use cadence::*;
pub use classify::*;
pub use model::*;
