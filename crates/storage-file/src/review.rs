//! Parked purchases awaiting manual review, one JSON array per event.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use loppiskassa_core::review::RejectedPurchase;
use loppiskassa_core::StorageError;

use crate::array_file;
use crate::journal::run_blocking;

/// Secondary index of purchases that failed automatic recovery.
///
/// The pending store remains authoritative for upload state; entries here
/// carry review bookkeeping (attempt counts, the triggering rejection) and
/// are reconciled against the log by the review service on read.
pub struct RejectedPurchaseStore {
    path: Arc<PathBuf>,
    lock: Mutex<()>,
}

impl RejectedPurchaseStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts the entry, or replaces an existing entry for the same
    /// purchase.
    pub async fn upsert(&self, entry: RejectedPurchase) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || {
            let mut rows: Vec<RejectedPurchase> = array_file::read_array(&path)?;
            match rows
                .iter_mut()
                .find(|row| row.purchase_id == entry.purchase_id)
            {
                Some(slot) => *slot = entry,
                None => rows.push(entry),
            }
            array_file::write_array(&path, &rows)
        })
        .await
    }

    /// Reads every parked purchase in insertion order.
    pub async fn get_all(&self) -> Result<Vec<RejectedPurchase>, StorageError> {
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || array_file::read_array(&path)).await
    }

    /// Removes one entry. Returns `true` when it existed.
    pub async fn remove(&self, purchase_id: &str) -> Result<bool, StorageError> {
        let purchase_id = purchase_id.to_string();
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || {
            let rows: Vec<RejectedPurchase> = array_file::read_array(&path)?;
            let before = rows.len();
            let kept: Vec<RejectedPurchase> = rows
                .into_iter()
                .filter(|row| row.purchase_id != purchase_id)
                .collect();

            if kept.len() == before {
                return Ok(false);
            }
            array_file::write_array(&path, &kept)?;
            Ok(true)
        })
        .await
    }

    /// Applies `mutate` to one entry in place. Returns `true` when the entry
    /// existed.
    pub async fn update<F>(&self, purchase_id: &str, mutate: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut RejectedPurchase) + Send + 'static,
    {
        let purchase_id = purchase_id.to_string();
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || {
            let mut rows: Vec<RejectedPurchase> = array_file::read_array(&path)?;
            let Some(slot) = rows.iter_mut().find(|row| row.purchase_id == purchase_id) else {
                return Ok(false);
            };
            mutate(slot);
            array_file::write_array(&path, &rows)?;
            Ok(true)
        })
        .await
    }
}
