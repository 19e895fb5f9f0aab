//! On-disk layout for event-scoped stores.

use std::path::{Path, PathBuf};

use loppiskassa_core::StorageError;

pub const SOLD_ITEMS_FILE: &str = "sold_items.json";
pub const PENDING_ITEMS_FILE: &str = "pending_items.jsonl";
pub const PENDING_SCANS_FILE: &str = "pending_scans.jsonl";
pub const COMMITTED_SCANS_FILE: &str = "committed_scans.jsonl";
pub const PENDING_REVIEW_FILE: &str = "pending_review.json";

/// Directory holding every store file for one event.
pub fn event_dir(root: &Path, event_id: &str) -> PathBuf {
    root.join("events").join(event_id)
}

/// Validates an event id before it is used as a path segment.
///
/// Backend event ids are opaque strings; anything that could escape the
/// events directory is refused here rather than sanitized.
pub fn validate_event_id(event_id: &str) -> Result<(), StorageError> {
    let valid = !event_id.is_empty()
        && event_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidEventId(event_id.to_string()))
    }
}
