//! Scan domain models: the offline retry queue row and the scan history row.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a recorded scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Confirmed,
    Duplicate,
    Rejected,
}

/// One scan awaiting backend confirmation. Strictly a retry queue row;
/// history lives in [`CommittedScan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingScan {
    pub scan_id: String,
    pub ticket_id: String,
    pub event_id: String,
    /// RFC 3339 time the ticket was scanned on-device.
    pub scanned_at: String,
    pub was_offline: bool,
}

/// One scan in the local history, regardless of whether the backend has
/// confirmed it yet. Duplicate detection while offline reads this store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedScan {
    pub scan_id: String,
    pub ticket_id: String,
    pub event_id: String,
    pub scanned_at: String,
    /// RFC 3339 time the backend confirmed the scan; `None` until then.
    pub committed_at: Option<String>,
    pub was_offline: bool,
    pub status: ScanStatus,
    pub ticket_type: Option<String>,
    pub email: Option<String>,
    pub error_message: Option<String>,
}

impl CommittedScan {
    /// History row for a scan that has just been queued for upload.
    pub fn from_pending(scan: &PendingScan) -> Self {
        Self {
            scan_id: scan.scan_id.clone(),
            ticket_id: scan.ticket_id.clone(),
            event_id: scan.event_id.clone(),
            scanned_at: scan.scanned_at.clone(),
            committed_at: None,
            was_offline: scan.was_offline,
            status: ScanStatus::Pending,
            ticket_type: None,
            email: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_status_serialization_matches_store_format() {
        let actual = [
            ScanStatus::Pending,
            ScanStatus::Confirmed,
            ScanStatus::Duplicate,
            ScanStatus::Rejected,
        ]
        .iter()
        .map(|status| serde_json::to_string(status).expect("serialize scan status"))
        .collect::<Vec<_>>();

        assert_eq!(
            actual,
            vec!["\"pending\"", "\"confirmed\"", "\"duplicate\"", "\"rejected\""]
        );
    }

    #[test]
    fn from_pending_starts_unconfirmed() {
        let pending = PendingScan {
            scan_id: "s1".to_string(),
            ticket_id: "t1".to_string(),
            event_id: "e1".to_string(),
            scanned_at: "2026-05-09T10:00:00+00:00".to_string(),
            was_offline: true,
        };

        let committed = CommittedScan::from_pending(&pending);
        assert_eq!(committed.status, ScanStatus::Pending);
        assert_eq!(committed.committed_at, None);
        assert!(committed.was_offline);
        assert_eq!(committed.ticket_id, "t1");
    }
}
