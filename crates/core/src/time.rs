//! Time helpers shared by stores and workers.

use chrono::{DateTime, Utc};

/// Current wall-clock time as RFC 3339 (UTC).
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parses an RFC 3339 timestamp into epoch milliseconds.
pub fn parse_rfc3339_millis(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Orders two RFC 3339 timestamps by instant, falling back to lexical
/// comparison when either fails to parse.
pub fn compare_timestamps(a: &str, b: &str) -> std::cmp::Ordering {
    match (parse_rfc3339_millis(a), parse_rfc3339_millis(b)) {
        (Some(a_ms), Some(b_ms)) => a_ms.cmp(&b_ms),
        _ => a.cmp(b),
    }
}
