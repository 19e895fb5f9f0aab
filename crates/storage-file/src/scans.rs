//! Scan stores: the upload retry queue and the append-only scan history.

use std::path::{Path, PathBuf};

use loppiskassa_core::scanning::{CommittedScan, PendingScan, ScanStatus};
use loppiskassa_core::StorageError;

use crate::journal::{Journal, JournalRecord};

impl JournalRecord for PendingScan {
    fn key(&self) -> &str {
        &self.scan_id
    }
}

impl JournalRecord for CommittedScan {
    fn key(&self) -> &str {
        &self.scan_id
    }
}

/// Queue of scans awaiting backend confirmation.
pub struct PendingScanStore {
    journal: Journal<PendingScan>,
}

impl PendingScanStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            journal: Journal::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }

    /// Enqueues one scan; a replayed `scan_id` is dropped.
    pub async fn append_scan(&self, scan: PendingScan) -> Result<usize, StorageError> {
        self.journal.append(vec![scan]).await
    }

    /// Reads the queue in insertion order (oldest first).
    pub async fn get_all_scans(&self) -> Result<Vec<PendingScan>, StorageError> {
        self.journal.read_all().await
    }

    /// Removes one scan after the backend confirmed (or terminally refused)
    /// it. Returns `true` when a row was actually removed.
    pub async fn remove_scan(&self, scan_id: &str) -> Result<bool, StorageError> {
        let scan_id = scan_id.to_string();
        let removed = self
            .journal
            .remove_where(move |row| row.scan_id == scan_id)
            .await?;
        Ok(removed > 0)
    }
}

/// Full local scan history, the source for offline duplicate detection.
pub struct CommittedScanStore {
    journal: Journal<CommittedScan>,
}

impl CommittedScanStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            journal: Journal::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }

    /// Records a scan in history; a replayed `scan_id` is dropped.
    pub async fn append_scan(&self, scan: CommittedScan) -> Result<usize, StorageError> {
        self.journal.append(vec![scan]).await
    }

    /// Reads the history in insertion order.
    pub async fn get_all_scans(&self) -> Result<Vec<CommittedScan>, StorageError> {
        self.journal.read_all().await
    }

    /// True when the ticket already appears in history. Rejected rows do not
    /// count: a scan the backend refused as invalid never admitted anyone,
    /// so re-scanning that ticket must not read as a duplicate.
    pub async fn has_ticket(&self, ticket_id: &str) -> Result<bool, StorageError> {
        let rows = self.journal.read_all().await?;
        Ok(rows
            .iter()
            .any(|row| row.ticket_id == ticket_id && row.status != ScanStatus::Rejected))
    }

    /// Writes the final state of one scan, replacing the provisional history
    /// row (or inserting it if the original write was lost).
    pub async fn record_result(&self, scan: CommittedScan) -> Result<(), StorageError> {
        self.journal.upsert(scan).await
    }

    /// Marks one history row rejected with a reason.
    pub async fn mark_rejected(
        &self,
        scan_id: &str,
        error_message: &str,
    ) -> Result<usize, StorageError> {
        let scan_id = scan_id.to_string();
        let error_message = error_message.to_string();
        self.journal
            .update_where(
                move |row| row.scan_id == scan_id,
                move |mut row| {
                    row.status = ScanStatus::Rejected;
                    row.error_message = Some(error_message.clone());
                    Some(row)
                },
            )
            .await
    }
}
