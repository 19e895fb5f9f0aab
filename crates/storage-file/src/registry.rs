//! One shared set of stores per event, opened lazily.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use loppiskassa_core::StorageError;

use crate::paths;
use crate::pending_items::PendingItemStore;
use crate::review::RejectedPurchaseStore;
use crate::scans::{CommittedScanStore, PendingScanStore};
use crate::sold_items::SoldItemStore;

/// Every store for one event, sharing the event's directory.
///
/// The per-store write locks only protect the files when each file has
/// exactly one store instance in the process; always obtain stores through
/// [`StoreRegistry`], which enforces that.
pub struct EventStores {
    event_id: String,
    sold_items: Arc<SoldItemStore>,
    pending_items: Arc<PendingItemStore>,
    pending_scans: Arc<PendingScanStore>,
    committed_scans: Arc<CommittedScanStore>,
    rejected_purchases: Arc<RejectedPurchaseStore>,
}

impl EventStores {
    /// Opens every store for one event, creating the directory if needed.
    pub fn open(root: &Path, event_id: &str) -> Result<Self, StorageError> {
        paths::validate_event_id(event_id)?;
        let dir = paths::event_dir(root, event_id);
        fs::create_dir_all(&dir).map_err(|err| StorageError::io(&dir, &err))?;

        Ok(Self {
            event_id: event_id.to_string(),
            sold_items: Arc::new(SoldItemStore::new(dir.join(paths::SOLD_ITEMS_FILE))),
            pending_items: Arc::new(PendingItemStore::new(dir.join(paths::PENDING_ITEMS_FILE))),
            pending_scans: Arc::new(PendingScanStore::new(dir.join(paths::PENDING_SCANS_FILE))),
            committed_scans: Arc::new(CommittedScanStore::new(
                dir.join(paths::COMMITTED_SCANS_FILE),
            )),
            rejected_purchases: Arc::new(RejectedPurchaseStore::new(
                dir.join(paths::PENDING_REVIEW_FILE),
            )),
        })
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn sold_items(&self) -> Arc<SoldItemStore> {
        Arc::clone(&self.sold_items)
    }

    pub fn pending_items(&self) -> Arc<PendingItemStore> {
        Arc::clone(&self.pending_items)
    }

    pub fn pending_scans(&self) -> Arc<PendingScanStore> {
        Arc::clone(&self.pending_scans)
    }

    pub fn committed_scans(&self) -> Arc<CommittedScanStore> {
        Arc::clone(&self.committed_scans)
    }

    pub fn rejected_purchases(&self) -> Arc<RejectedPurchaseStore> {
        Arc::clone(&self.rejected_purchases)
    }
}

/// Process-wide registry handing out one [`EventStores`] per event id.
pub struct StoreRegistry {
    root: PathBuf,
    stores_by_event: Mutex<HashMap<String, Arc<EventStores>>>,
}

impl StoreRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stores_by_event: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the shared stores for `event_id`, opening them on first use.
    ///
    /// The map lock is held across the open so two racing callers can never
    /// end up with distinct store instances over the same files.
    pub fn event(&self, event_id: &str) -> Result<Arc<EventStores>, StorageError> {
        let mut map = self.stores_by_event.lock().unwrap();
        if let Some(stores) = map.get(event_id) {
            return Ok(Arc::clone(stores));
        }

        let stores = Arc::new(EventStores::open(&self.root, event_id)?);
        map.insert(event_id.to_string(), Arc::clone(&stores));
        Ok(stores)
    }
}
