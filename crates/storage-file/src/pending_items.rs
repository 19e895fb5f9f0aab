//! Pending upload queue for sold items.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use loppiskassa_core::notify::{ChangeListener, ChangeNotifier};
use loppiskassa_core::sales::{count_purchase_errors, ErrorCounts, PendingItem};
use loppiskassa_core::StorageError;

use crate::journal::{Journal, JournalRecord};

impl JournalRecord for PendingItem {
    fn key(&self) -> &str {
        &self.item_id
    }
}

/// Queue of items not yet confirmed by the backend.
///
/// Row presence is the only "not confirmed" signal and deletion the only
/// success signal; nothing else in the system tracks upload state. Every
/// committed mutation ticks the change notifier so badge observers can
/// re-read.
pub struct PendingItemStore {
    journal: Journal<PendingItem>,
    notifier: ChangeNotifier,
}

impl PendingItemStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            journal: Journal::new(path),
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }

    /// Enqueues items for upload; keys already queued are dropped.
    pub async fn append_items(&self, items: Vec<PendingItem>) -> Result<usize, StorageError> {
        let appended = self.journal.append(items).await?;
        if appended > 0 {
            self.notifier.notify();
        }
        Ok(appended)
    }

    /// Reads the whole queue in insertion order.
    pub async fn get_all_items(&self) -> Result<Vec<PendingItem>, StorageError> {
        self.journal.read_all().await
    }

    /// Applies `transform` to every row of one purchase; returning `None`
    /// deletes the row. Returns the number of rows affected.
    pub async fn update_purchase<T>(
        &self,
        purchase_id: &str,
        transform: T,
    ) -> Result<usize, StorageError>
    where
        T: FnMut(PendingItem) -> Option<PendingItem> + Send + 'static,
    {
        let purchase_id = purchase_id.to_string();
        let affected = self
            .journal
            .update_where(move |row| row.purchase_id == purchase_id, transform)
            .await?;
        if affected > 0 {
            self.notifier.notify();
        }
        Ok(affected)
    }

    /// Removes every row of one purchase.
    pub async fn delete_purchase(&self, purchase_id: &str) -> Result<usize, StorageError> {
        self.update_purchase(purchase_id, |_| None).await
    }

    /// Removes the given items; the normal acceptance path.
    pub async fn delete_items(&self, item_ids: &[String]) -> Result<usize, StorageError> {
        if item_ids.is_empty() {
            return Ok(0);
        }
        let ids: HashSet<String> = item_ids.iter().cloned().collect();
        let affected = self
            .journal
            .remove_where(move |row| ids.contains(&row.item_id))
            .await?;
        if affected > 0 {
            self.notifier.notify();
        }
        Ok(affected)
    }

    /// Writes a rejection reason onto one row.
    pub async fn set_error_text(
        &self,
        item_id: &str,
        error_text: &str,
    ) -> Result<usize, StorageError> {
        let item_id = item_id.to_string();
        let error_text = error_text.to_string();
        let affected = self
            .journal
            .update_where(
                move |row| row.item_id == item_id,
                move |mut row| {
                    row.error_text = error_text.clone();
                    Some(row)
                },
            )
            .await?;
        if affected > 0 {
            self.notifier.notify();
        }
        Ok(affected)
    }

    /// Writes one rejection reason onto every row of a purchase. Used for
    /// whole-batch failures such as a backend 5xx.
    pub async fn set_purchase_error(
        &self,
        purchase_id: &str,
        error_text: &str,
    ) -> Result<usize, StorageError> {
        let error_text = error_text.to_string();
        self.update_purchase(purchase_id, move |mut row| {
            row.error_text = error_text.clone();
            Some(row)
        })
        .await
    }

    /// Per-purchase severity counts for the status badge.
    pub async fn get_error_counts(&self) -> Result<ErrorCounts, StorageError> {
        let rows = self.journal.read_all().await?;
        Ok(count_purchase_errors(&rows))
    }

    /// Listener ticked after every committed mutation. Advisory only;
    /// observers must re-read the store for actual state.
    pub fn subscribe(&self) -> ChangeListener {
        self.notifier.subscribe()
    }
}
