//! Classification of failed uploads into recovery strategies.

use super::model::{RejectionCode, UploadErrorKind};

/// Cap on error messages lifted out of response bodies.
const MAX_MESSAGE_CHARS: usize = 300;

/// Maps a non-2xx HTTP response to an error kind.
///
/// Transport failures (timeout, connection refused) never reach this point:
/// workers abort the run on those and leave the rows untouched, the state
/// [`UploadErrorKind::NetworkError`] names.
pub fn classify_http_response(status: u16, body: &str) -> UploadErrorKind {
    match status {
        500..=599 => UploadErrorKind::ServerError,
        400 => UploadErrorKind::ValidationError(extract_message(status, body)),
        _ => UploadErrorKind::Unknown(format!("HTTP {status}")),
    }
}

/// Maps a structured per-item rejection to an error kind.
pub fn classify_rejection(code: RejectionCode, reason: &str) -> UploadErrorKind {
    match code {
        RejectionCode::InvalidSeller => UploadErrorKind::InvalidSeller,
        RejectionCode::DuplicateReceipt => UploadErrorKind::Duplicate,
        RejectionCode::Unspecified => {
            UploadErrorKind::Unknown(truncate_chars(reason, MAX_MESSAGE_CHARS))
        }
    }
}

/// Pulls `{"message": "..."}` out of an error body, falling back to the raw
/// body, then to the status line.
fn extract_message(status: u16, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.is_empty() {
        return format!("HTTP {status}");
    }
    truncate_chars(&message, MAX_MESSAGE_CHARS)
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        value.chars().take(max).collect()
    }
}
