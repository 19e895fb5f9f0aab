//! Client construction errors.

use thiserror::Error;

/// Errors raised while building the API client.
///
/// Request-time failures never surface here; they are folded into
/// [`crate::NetworkOutcome`] so the sync layer can classify them.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_is_descriptive() {
        let err = ApiError::Config("invalid access token format".to_string());
        assert!(err.to_string().contains("invalid access token format"));
    }
}
