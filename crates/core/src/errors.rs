//! Shared error types across the Loppiskassa crates.

use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the file store layer.
///
/// These always propagate to callers; a sale or scan that cannot be made
/// durable must never look recorded.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("corrupt store file {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("failed to encode store row: {0}")]
    Encode(String),

    #[error("invalid event id: {0}")]
    InvalidEventId(String),

    #[error("store task failed: {0}")]
    Background(String),
}

impl StorageError {
    pub fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub fn corrupt(path: &Path, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

/// Top-level error for service-facing operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("api error: {0}")]
    Api(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
