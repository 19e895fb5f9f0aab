//! Sync domain models shared by workers, recovery, and the scheduler.

use serde::{Deserialize, Serialize};

/// Structured rejection codes attached by the backend to refused items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    InvalidSeller,
    DuplicateReceipt,
    Unspecified,
}

impl RejectionCode {
    /// Parses a wire code; unknown values map to `Unspecified`.
    pub fn parse(code: &str) -> Self {
        match code {
            "INVALID_SELLER" => Self::InvalidSeller,
            "DUPLICATE_RECEIPT" => Self::DuplicateReceipt,
            _ => Self::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSeller => "INVALID_SELLER",
            Self::DuplicateReceipt => "DUPLICATE_RECEIPT",
            Self::Unspecified => "UNSPECIFIED",
        }
    }
}

/// How one failed upload should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadErrorKind {
    /// Backend 5xx. Rows get the reserved sentinel and stay retryable.
    ServerError,
    /// Structured INVALID_SELLER rejection; eligible for automatic recovery.
    InvalidSeller,
    /// Structured DUPLICATE_RECEIPT rejection; resolves as silent success.
    Duplicate,
    /// Transport-level failure before any HTTP response arrived.
    NetworkError,
    /// Backend 400 with a human-readable message; needs user action.
    ValidationError(String),
    /// Anything else; rows are left untouched for a later retry.
    Unknown(String),
}

/// Outcome of one worker run, as consumed by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerOutcome {
    Completed,
    Retry,
}

/// Lightweight run metrics emitted by sync workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub outcome: WorkerOutcome,
    pub uploaded: usize,
    pub rejected: usize,
    pub deferred: usize,
    pub duration_ms: i64,
    /// True when this run crossed the missed-upload alert threshold.
    pub offline_alert: bool,
}

impl RunSummary {
    pub fn empty(outcome: WorkerOutcome) -> Self {
        Self {
            outcome,
            uploaded: 0,
            rejected: 0,
            deferred: 0,
            duration_ms: 0,
            offline_alert: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_code_serialization_matches_backend_contract() {
        let actual = [
            RejectionCode::InvalidSeller,
            RejectionCode::DuplicateReceipt,
            RejectionCode::Unspecified,
        ]
        .iter()
        .map(|code| serde_json::to_string(code).expect("serialize rejection code"))
        .collect::<Vec<_>>();

        assert_eq!(
            actual,
            vec!["\"INVALID_SELLER\"", "\"DUPLICATE_RECEIPT\"", "\"UNSPECIFIED\""]
        );
    }

    #[test]
    fn unknown_codes_parse_as_unspecified() {
        assert_eq!(RejectionCode::parse("INVALID_SELLER"), RejectionCode::InvalidSeller);
        assert_eq!(
            RejectionCode::parse("DUPLICATE_RECEIPT"),
            RejectionCode::DuplicateReceipt
        );
        assert_eq!(RejectionCode::parse("EXPIRED_EVENT"), RejectionCode::Unspecified);
        assert_eq!(RejectionCode::parse(""), RejectionCode::Unspecified);
    }

    #[test]
    fn parse_and_as_str_round_trip() {
        for code in [
            RejectionCode::InvalidSeller,
            RejectionCode::DuplicateReceipt,
            RejectionCode::Unspecified,
        ] {
            assert_eq!(RejectionCode::parse(code.as_str()), code);
        }
    }
}
