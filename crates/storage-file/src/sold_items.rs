//! Permanent transaction log of sold items, one JSON array per event.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use loppiskassa_core::sales::StoredSoldItem;
use loppiskassa_core::StorageError;

use crate::array_file;
use crate::journal::run_blocking;

/// Append-mostly log of everything sold at the register.
///
/// Unlike the queue stores this file is never pruned by sync; rows only gain
/// the `uploaded` flag once the backend confirms them. Deletion exists solely
/// for the manual-review flow, for sales the backend never accepted.
pub struct SoldItemStore {
    path: Arc<PathBuf>,
    lock: Mutex<()>,
}

impl SoldItemStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends rows, dropping any whose `item_id` is already stored. Returns
    /// the number actually written; an empty input never touches the file.
    pub async fn append_sold_items(
        &self,
        items: Vec<StoredSoldItem>,
    ) -> Result<usize, StorageError> {
        if items.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || {
            let mut rows: Vec<StoredSoldItem> = array_file::read_array(&path)?;
            let mut seen: HashSet<String> = rows.iter().map(|row| row.item_id.clone()).collect();

            let before = rows.len();
            for item in items {
                if seen.insert(item.item_id.clone()) {
                    rows.push(item);
                }
            }

            let appended = rows.len() - before;
            if appended == 0 {
                return Ok(0);
            }
            array_file::write_array(&path, &rows)?;
            Ok(appended)
        })
        .await
    }

    /// Reads the full log in insertion order.
    pub async fn get_all_sold_items(&self) -> Result<Vec<StoredSoldItem>, StorageError> {
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || array_file::read_array(&path)).await
    }

    /// Replaces the entire log in one atomic write. This is the
    /// bulk-correction primitive; the normal write path is append.
    pub async fn save_sold_items(&self, items: Vec<StoredSoldItem>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || array_file::write_array(&path, &items)).await
    }

    /// Marks the given items uploaded. The flag never transitions back.
    pub async fn mark_items_uploaded(
        &self,
        item_ids: Vec<String>,
    ) -> Result<usize, StorageError> {
        if item_ids.is_empty() {
            return Ok(0);
        }
        let ids: HashSet<String> = item_ids.into_iter().collect();
        self.mark_uploaded_where(move |row| ids.contains(&row.item_id))
            .await
    }

    /// Marks every row of one purchase uploaded.
    pub async fn mark_purchase_uploaded(&self, purchase_id: &str) -> Result<usize, StorageError> {
        let purchase_id = purchase_id.to_string();
        self.mark_uploaded_where(move |row| row.purchase_id == purchase_id)
            .await
    }

    /// Rewrites the seller number on every row of one purchase. Used by the
    /// review flow when a mistyped seller is corrected after the fact.
    pub async fn set_purchase_seller(
        &self,
        purchase_id: &str,
        seller: i32,
    ) -> Result<usize, StorageError> {
        let purchase_id = purchase_id.to_string();
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || {
            let mut rows: Vec<StoredSoldItem> = array_file::read_array(&path)?;
            let mut affected = 0usize;
            for row in rows.iter_mut() {
                if row.purchase_id == purchase_id && row.seller != seller {
                    row.seller = seller;
                    affected += 1;
                }
            }

            if affected == 0 {
                return Ok(0);
            }
            array_file::write_array(&path, &rows)?;
            Ok(affected)
        })
        .await
    }

    /// Deletes every row of one purchase. Returns the number removed.
    pub async fn delete_purchase(&self, purchase_id: &str) -> Result<usize, StorageError> {
        let purchase_id = purchase_id.to_string();
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || {
            let rows: Vec<StoredSoldItem> = array_file::read_array(&path)?;
            let before = rows.len();
            let kept: Vec<StoredSoldItem> = rows
                .into_iter()
                .filter(|row| row.purchase_id != purchase_id)
                .collect();

            let removed = before - kept.len();
            if removed == 0 {
                return Ok(0);
            }
            array_file::write_array(&path, &kept)?;
            Ok(removed)
        })
        .await
    }

    async fn mark_uploaded_where<P>(&self, predicate: P) -> Result<usize, StorageError>
    where
        P: Fn(&StoredSoldItem) -> bool + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        run_blocking(move || {
            let mut rows: Vec<StoredSoldItem> = array_file::read_array(&path)?;
            let mut affected = 0usize;
            for row in rows.iter_mut() {
                if !row.uploaded && predicate(row) {
                    row.uploaded = true;
                    affected += 1;
                }
            }

            if affected == 0 {
                return Ok(0);
            }
            array_file::write_array(&path, &rows)?;
            Ok(affected)
        })
        .await
    }
}
