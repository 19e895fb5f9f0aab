//! Core domain models and shared services for the Loppiskassa client.
//!
//! Everything in this crate is stateless or purely in-memory. Durable state
//! belongs to the file store crate and network access to the backend-api
//! crate; both depend on the types defined here.

pub mod alerts;
pub mod errors;
pub mod notify;
pub mod review;
pub mod sales;
pub mod scanning;
pub mod sync;
pub mod time;

pub use errors::{Error, Result, StorageError};
