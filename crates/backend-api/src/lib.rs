//! HTTP client for the Loppiskassa event backend.
//!
//! Every endpoint returns a [`NetworkOutcome`] instead of a transport error
//! type: callers branch on HTTP status, timeout, and connection failure as
//! plain data, which keeps retry and recovery decisions in the sync layer.

mod client;
mod error;
mod outcome;
mod types;

pub use client::{ApiClient, BackendApi};
pub use error::ApiError;
pub use outcome::NetworkOutcome;
pub use types::*;
