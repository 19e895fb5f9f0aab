//! Point-in-time sync state for the UI, plus the badge watcher.

use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use loppiskassa_core::sales::ErrorCounts;
use loppiskassa_core::sync::RunSummary;
use loppiskassa_core::StorageError;
use loppiskassa_storage_file::{EventStores, PendingItemStore};

/// Snapshot of everything still waiting on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub event_id: String,
    pub pending_sale_items: usize,
    pub pending_scans: usize,
    pub error_counts: ErrorCounts,
    pub needs_review: usize,
    /// Most recent worker run, if any ran this session. Filled by
    /// `SyncContext::status`; plain store snapshots leave it empty.
    pub last_run: Option<RunSummary>,
}

/// Collects a status snapshot across the event's stores.
pub async fn collect_status(stores: &EventStores) -> Result<SyncStatus, StorageError> {
    let pending = stores.pending_items().get_all_items().await?;
    let scans = stores.pending_scans().get_all_scans().await?;
    let review = stores.rejected_purchases().get_all().await?;

    Ok(SyncStatus {
        event_id: stores.event_id().to_string(),
        pending_sale_items: pending.len(),
        pending_scans: scans.len(),
        error_counts: loppiskassa_core::sales::count_purchase_errors(&pending),
        needs_review: review.iter().filter(|entry| entry.needs_manual_review).count(),
        last_run: None,
    })
}

/// Spawns a loop that recomputes severity counts after every queue change
/// and hands them to `on_counts`. The loop ends when the store goes away.
pub fn spawn_badge_watcher<F>(store: Arc<PendingItemStore>, on_counts: F) -> JoinHandle<()>
where
    F: Fn(ErrorCounts) + Send + Sync + 'static,
{
    let mut listener = store.subscribe();
    tokio::spawn(async move {
        while listener.changed().await {
            match store.get_error_counts().await {
                Ok(counts) => on_counts(counts),
                Err(err) => warn!("[Status] Failed to recompute error counts: {err}"),
            }
        }
    })
}
