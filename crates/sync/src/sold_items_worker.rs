//! Background upload worker for the pending sold-item queue.
//!
//! Purchases upload oldest-first as atomic batches. An HTTP error only
//! affects the purchase that hit it; a transport failure means the network
//! itself is gone, so the run aborts and the rest of the queue waits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use loppiskassa_backend_api::{
    NetworkOutcome, RejectedItemReport, SoldItemBatchRequest, SoldItemBatchResponse, SoldItemUpload,
};
use loppiskassa_core::sales::{PaymentMethod, PendingItem, StoredSoldItem, SERVER_ERROR_SENTINEL};
use loppiskassa_core::sync::{
    classify_http_response, RunSummary, UploadErrorKind, WorkerOutcome,
};
use loppiskassa_core::time::{compare_timestamps, now_epoch_millis, parse_rfc3339_millis};
use loppiskassa_core::Result;

use crate::context::SyncContext;
use crate::recovery::{rejection_kind, PurchaseRecoveryManager, RecoveryOutcome};
use crate::scheduler::SyncTask;

/// Scheduler task name for this worker.
pub const SOLD_ITEMS_TASK: &str = "sold_items_sync";

pub struct SoldItemsSyncWorker {
    context: Arc<SyncContext>,
    recovery: Arc<PurchaseRecoveryManager>,
    run_lock: Mutex<()>,
}

/// Per-purchase accounting rolled up into the run summary.
#[derive(Debug, Default)]
struct PurchaseReport {
    uploaded: usize,
    rejected: usize,
    deferred: usize,
    offline_alert: bool,
    abort_run: bool,
}

enum BatchRejectionKind {
    InvalidSeller,
    Duplicate,
    Other,
}

impl SoldItemsSyncWorker {
    pub fn new(context: Arc<SyncContext>, recovery: Arc<PurchaseRecoveryManager>) -> Self {
        Self {
            context,
            recovery,
            run_lock: Mutex::new(()),
        }
    }

    /// Runs one upload pass over the whole queue. Overlapping calls queue up
    /// behind the run lock rather than racing the same rows.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let _run = self.run_lock.lock().await;
        let started = Instant::now();
        let stores = self.context.stores();

        let rows = stores.pending_items().get_all_items().await?;
        if rows.is_empty() {
            let summary = RunSummary::empty(WorkerOutcome::Completed);
            self.context.record_run(&summary);
            return Ok(summary);
        }

        let log = stores.sold_items().get_all_sold_items().await?;
        let log_index = index_log_by_item(&log);

        let mut summary = RunSummary::empty(WorkerOutcome::Completed);
        let mut groups = group_by_purchase(rows).into_iter();
        for (purchase_id, purchase_rows) in groups.by_ref() {
            let report = self
                .process_purchase(&purchase_id, &purchase_rows, &log_index)
                .await?;
            summary.uploaded += report.uploaded;
            summary.rejected += report.rejected;
            summary.deferred += report.deferred;
            summary.offline_alert |= report.offline_alert;
            if report.abort_run {
                summary.outcome = WorkerOutcome::Retry;
                break;
            }
        }
        for (_, remaining) in groups {
            summary.deferred += remaining.len();
        }

        summary.duration_ms = started.elapsed().as_millis() as i64;
        info!(
            "[SoldItemsSync] Run finished: outcome={:?} uploaded={} rejected={} deferred={} in {}ms",
            summary.outcome, summary.uploaded, summary.rejected, summary.deferred, summary.duration_ms
        );
        self.context.record_run(&summary);
        Ok(summary)
    }

    async fn process_purchase(
        &self,
        purchase_id: &str,
        rows: &[PendingItem],
        log_index: &HashMap<&str, &StoredSoldItem>,
    ) -> Result<PurchaseReport> {
        let uploadable: Vec<&PendingItem> = rows
            .iter()
            .filter(|row| row.is_awaiting_upload() || row.has_server_error())
            .collect();
        if uploadable.is_empty() {
            // Rows holding a user-actionable rejection wait for an edit.
            return Ok(PurchaseReport { deferred: rows.len(), ..PurchaseReport::default() });
        }

        let request = build_batch_request(&uploadable, log_index);
        let stores = self.context.stores();
        match self
            .context
            .api()
            .upload_sold_items(self.context.event_id(), request)
            .await
        {
            NetworkOutcome::Success(response) => {
                self.apply_batch_response(purchase_id, response).await
            }
            NetworkOutcome::Http { status, body } => match classify_http_response(status, &body) {
                UploadErrorKind::ServerError => {
                    warn!(
                        "[SoldItemsSync] HTTP {status} for purchase {purchase_id}; marked with server error"
                    );
                    stores
                        .pending_items()
                        .set_purchase_error(purchase_id, SERVER_ERROR_SENTINEL)
                        .await?;
                    Ok(PurchaseReport { rejected: uploadable.len(), ..PurchaseReport::default() })
                }
                _ => {
                    // Batch-level non-5xx without per-item reasons: nothing
                    // the cashier can act on, so the rows stay clean and the
                    // next run retries them.
                    warn!("[SoldItemsSync] Unexpected HTTP {status} for purchase {purchase_id}; left queued");
                    Ok(PurchaseReport { deferred: uploadable.len(), ..PurchaseReport::default() })
                }
            },
            outcome @ (NetworkOutcome::Timeout | NetworkOutcome::ConnectionFailed(_)) => {
                let offline_alert = self.context.gatekeeper().record_missed_upload(purchase_id);
                warn!(
                    "[SoldItemsSync] Transport failure for purchase {purchase_id}: {}; aborting run",
                    describe_transport(&outcome)
                );
                Ok(PurchaseReport {
                    deferred: uploadable.len(),
                    offline_alert,
                    abort_run: true,
                    ..PurchaseReport::default()
                })
            }
        }
    }

    async fn apply_batch_response(
        &self,
        purchase_id: &str,
        response: SoldItemBatchResponse,
    ) -> Result<PurchaseReport> {
        let stores = self.context.stores();
        let accepted = response.accepted_items;
        if !accepted.is_empty() {
            stores.sold_items().mark_items_uploaded(accepted.clone()).await?;
            stores.pending_items().delete_items(&accepted).await?;
            self.context.gatekeeper().record_successful_upload();
        }

        if response.rejected_items.is_empty() {
            stores.rejected_purchases().remove(purchase_id).await?;
            self.recovery.on_purchase_resolved(purchase_id);
            debug!(
                "[SoldItemsSync] Purchase {purchase_id} uploaded ({} item(s))",
                accepted.len()
            );
            return Ok(PurchaseReport { uploaded: accepted.len(), ..PurchaseReport::default() });
        }

        // Every rejection reason lands on its row before recovery runs, so
        // the review screen has text even if recovery is interrupted.
        for report in &response.rejected_items {
            stores
                .pending_items()
                .set_error_text(&report.item.item_id, &report.reason)
                .await?;
        }

        let rejected_count = response.rejected_items.len();
        match classify_batch(&response.rejected_items) {
            BatchRejectionKind::Duplicate => {
                self.recovery.resolve_duplicate(purchase_id).await?;
                Ok(PurchaseReport {
                    uploaded: accepted.len() + rejected_count,
                    ..PurchaseReport::default()
                })
            }
            BatchRejectionKind::InvalidSeller => {
                let outcome = self
                    .recovery
                    .recover_invalid_seller(purchase_id, &response.rejected_items)
                    .await?;
                info!("[SoldItemsSync] Recovery for purchase {purchase_id}: {outcome:?}");
                match outcome {
                    RecoveryOutcome::Recovered | RecoveryOutcome::RecoveredSilently => {
                        Ok(PurchaseReport {
                            uploaded: accepted.len() + rejected_count,
                            ..PurchaseReport::default()
                        })
                    }
                    RecoveryOutcome::LeftPending => Ok(PurchaseReport {
                        uploaded: accepted.len(),
                        deferred: rejected_count,
                        ..PurchaseReport::default()
                    }),
                    RecoveryOutcome::NeedsManualReview(_) | RecoveryOutcome::Failed(_) => {
                        Ok(PurchaseReport {
                            uploaded: accepted.len(),
                            rejected: rejected_count,
                            ..PurchaseReport::default()
                        })
                    }
                }
            }
            BatchRejectionKind::Other => {
                warn!("[SoldItemsSync] Purchase {purchase_id}: {rejected_count} item(s) rejected");
                Ok(PurchaseReport {
                    uploaded: accepted.len(),
                    rejected: rejected_count,
                    ..PurchaseReport::default()
                })
            }
        }
    }
}

#[async_trait]
impl SyncTask for SoldItemsSyncWorker {
    fn name(&self) -> &'static str {
        SOLD_ITEMS_TASK
    }

    async fn run(&self) -> WorkerOutcome {
        match self.run_once().await {
            Ok(summary) => summary.outcome,
            Err(err) => {
                warn!("[SoldItemsSync] Run failed: {err}");
                WorkerOutcome::Retry
            }
        }
    }
}

/// Groups queue rows by purchase, ordered by each purchase's oldest row.
fn group_by_purchase(rows: Vec<PendingItem>) -> Vec<(String, Vec<PendingItem>)> {
    let mut order: Vec<String> = Vec::new();
    let mut by_purchase: HashMap<String, Vec<PendingItem>> = HashMap::new();
    for row in rows {
        if !by_purchase.contains_key(&row.purchase_id) {
            order.push(row.purchase_id.clone());
        }
        by_purchase.entry(row.purchase_id.clone()).or_default().push(row);
    }

    let mut groups: Vec<(String, Vec<PendingItem>)> = order
        .into_iter()
        .filter_map(|purchase_id| {
            by_purchase.remove(&purchase_id).map(|rows| (purchase_id, rows))
        })
        .collect();
    groups.sort_by(|a, b| compare_timestamps(earliest(&a.1), earliest(&b.1)));
    groups
}

fn earliest(rows: &[PendingItem]) -> &str {
    rows.iter()
        .map(|row| row.timestamp.as_str())
        .min_by(|a, b| compare_timestamps(a, b))
        .unwrap_or_default()
}

pub(crate) fn index_log_by_item(log: &[StoredSoldItem]) -> HashMap<&str, &StoredSoldItem> {
    log.iter().map(|row| (row.item_id.as_str(), row)).collect()
}

/// Builds the upload payload for one purchase, joining queue rows with the
/// transaction log for the payment data the queue does not carry.
pub(crate) fn build_batch_request(
    rows: &[&PendingItem],
    log_index: &HashMap<&str, &StoredSoldItem>,
) -> SoldItemBatchRequest {
    let items = rows
        .iter()
        .map(|row| {
            let (payment_method, sold_time) = match log_index.get(row.item_id.as_str()) {
                Some(stored) => (stored.payment_method, stored.sold_time),
                // Log row lost to a crash window; the queue row still
                // describes the sale.
                None => (
                    PaymentMethod::Cash,
                    parse_rfc3339_millis(&row.timestamp).unwrap_or_else(now_epoch_millis),
                ),
            };
            SoldItemUpload {
                item_id: row.item_id.clone(),
                purchase_id: row.purchase_id.clone(),
                seller: row.seller_id,
                price: row.price,
                payment_method,
                sold_time,
            }
        })
        .collect();
    SoldItemBatchRequest { items }
}

fn classify_batch(rejected: &[RejectedItemReport]) -> BatchRejectionKind {
    let mut all_duplicates = !rejected.is_empty();
    for report in rejected {
        match rejection_kind(report) {
            UploadErrorKind::InvalidSeller => return BatchRejectionKind::InvalidSeller,
            UploadErrorKind::Duplicate => {}
            _ => all_duplicates = false,
        }
    }
    if all_duplicates {
        BatchRejectionKind::Duplicate
    } else {
        BatchRejectionKind::Other
    }
}

fn describe_transport<T>(outcome: &NetworkOutcome<T>) -> &str {
    match outcome {
        NetworkOutcome::Timeout => "timeout",
        NetworkOutcome::ConnectionFailed(reason) => reason,
        _ => "unexpected outcome",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use loppiskassa_backend_api::{
        BackendApi, ScanRequest, TicketResponse, TicketTypeInfo, VendorFilterPage,
    };
    use loppiskassa_core::sales::PurchaseSeverity;
    use loppiskassa_storage_file::EventStores;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct ScriptedBackend {
        upload_responses: StdMutex<VecDeque<NetworkOutcome<SoldItemBatchResponse>>>,
        requests: StdMutex<Vec<SoldItemBatchRequest>>,
        upload_calls: AtomicUsize,
        sellers: Vec<i32>,
    }

    impl ScriptedBackend {
        fn push(&self, outcome: NetworkOutcome<SoldItemBatchResponse>) {
            self.upload_responses.lock().unwrap().push_back(outcome);
        }
    }

    #[async_trait]
    impl BackendApi for ScriptedBackend {
        async fn upload_sold_items(
            &self,
            _event_id: &str,
            request: SoldItemBatchRequest,
        ) -> NetworkOutcome<SoldItemBatchResponse> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.upload_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(NetworkOutcome::Timeout)
        }

        async fn fetch_vendor_page(
            &self,
            _event_id: &str,
            _page_size: usize,
            _page_token: Option<&str>,
        ) -> NetworkOutcome<VendorFilterPage> {
            NetworkOutcome::Success(VendorFilterPage {
                sellers: self.sellers.clone(),
                next_page_token: None,
            })
        }

        async fn fetch_ticket_types(&self, _event_id: &str) -> NetworkOutcome<Vec<TicketTypeInfo>> {
            NetworkOutcome::Success(Vec::new())
        }

        async fn commit_scan(
            &self,
            _event_id: &str,
            _request: ScanRequest,
        ) -> NetworkOutcome<TicketResponse> {
            NetworkOutcome::Timeout
        }
    }

    struct Fixture {
        worker: SoldItemsSyncWorker,
        context: Arc<SyncContext>,
        backend: Arc<ScriptedBackend>,
    }

    fn fixture(dir: &TempDir, backend: ScriptedBackend) -> Fixture {
        let stores = EventStores::open(dir.path(), "e1").unwrap();
        let backend = Arc::new(backend);
        let context = Arc::new(SyncContext::new(
            Arc::new(stores),
            Arc::clone(&backend) as Arc<dyn BackendApi>,
            SyncConfig::new("https://api.example.com", "token"),
        ));
        let recovery = Arc::new(PurchaseRecoveryManager::new(Arc::clone(&context)));
        Fixture {
            worker: SoldItemsSyncWorker::new(Arc::clone(&context), recovery),
            context,
            backend,
        }
    }

    async fn seed(fixture: &Fixture, purchase_id: &str, item_ids: &[&str], timestamp: &str) {
        let stores = fixture.context.stores();
        let mut pending = Vec::new();
        let mut sold = Vec::new();
        for item_id in item_ids {
            pending.push(PendingItem {
                item_id: (*item_id).to_string(),
                purchase_id: purchase_id.to_string(),
                seller_id: 12,
                price: 500,
                error_text: String::new(),
                timestamp: timestamp.to_string(),
            });
            sold.push(StoredSoldItem {
                item_id: (*item_id).to_string(),
                event_id: "e1".to_string(),
                purchase_id: purchase_id.to_string(),
                seller: 12,
                price: 500,
                payment_method: PaymentMethod::Swish,
                sold_time: 1_762_700_000_000,
                uploaded: false,
            });
        }
        stores.pending_items().append_items(pending).await.unwrap();
        stores.sold_items().append_sold_items(sold).await.unwrap();
    }

    fn accept_all(item_ids: &[&str]) -> NetworkOutcome<SoldItemBatchResponse> {
        NetworkOutcome::Success(SoldItemBatchResponse {
            accepted_items: item_ids.iter().map(|id| (*id).to_string()).collect(),
            rejected_items: Vec::new(),
        })
    }

    fn reject(item_id: &str, code: &str, reason: &str) -> RejectedItemReport {
        RejectedItemReport {
            item: SoldItemUpload {
                item_id: item_id.to_string(),
                purchase_id: "p1".to_string(),
                seller: 12,
                price: 500,
                payment_method: PaymentMethod::Swish,
                sold_time: 1_762_700_000_000,
            },
            reason: reason.to_string(),
            error_code: Some(code.to_string()),
        }
    }

    #[tokio::test]
    async fn accepted_purchases_clear_the_queue_oldest_first() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, ScriptedBackend::default());
        // p2 recorded first in the file but p1 is older.
        seed(&f, "p2", &["i3"], "2026-05-09T10:05:00+00:00").await;
        seed(&f, "p1", &["i1", "i2"], "2026-05-09T10:00:00+00:00").await;
        f.backend.push(accept_all(&["i1", "i2"]));
        f.backend.push(accept_all(&["i3"]));

        let summary = f.worker.run_once().await.unwrap();
        assert_eq!(summary.outcome, WorkerOutcome::Completed);
        assert_eq!(summary.uploaded, 3);
        assert_eq!(summary.rejected, 0);

        let requests = f.backend.requests.lock().unwrap();
        assert_eq!(requests[0].items[0].purchase_id, "p1");
        assert_eq!(requests[1].items[0].purchase_id, "p2");
        drop(requests);

        let stores = f.context.stores();
        assert!(stores.pending_items().get_all_items().await.unwrap().is_empty());
        assert!(stores
            .sold_items()
            .get_all_sold_items()
            .await
            .unwrap()
            .iter()
            .all(|row| row.uploaded));
    }

    #[tokio::test]
    async fn partial_acceptance_rejects_only_the_refused_row() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, ScriptedBackend::default());
        seed(&f, "p1", &["i1", "i2", "i3", "i4"], "2026-05-09T10:00:00+00:00").await;
        f.backend.push(NetworkOutcome::Success(SoldItemBatchResponse {
            accepted_items: vec!["i1".to_string(), "i2".to_string(), "i3".to_string()],
            rejected_items: vec![reject("i4", "EVENT_CLOSED", "insamlingen är stängd")],
        }));

        let summary = f.worker.run_once().await.unwrap();
        assert_eq!(summary.uploaded, 3);
        assert_eq!(summary.rejected, 1);

        let stores = f.context.stores();
        let pending = stores.pending_items().get_all_items().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].item_id, "i4");
        assert_eq!(pending[0].error_text, "insamlingen är stängd");

        let counts = stores.pending_items().get_error_counts().await.unwrap();
        assert_eq!(counts.highest(), Some(PurchaseSeverity::Warning));

        let uploaded: Vec<bool> = stores
            .sold_items()
            .get_all_sold_items()
            .await
            .unwrap()
            .iter()
            .map(|row| row.uploaded)
            .collect();
        assert_eq!(uploaded, vec![true, true, true, false]);
    }

    #[tokio::test]
    async fn server_error_marks_the_purchase_and_continues() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, ScriptedBackend::default());
        seed(&f, "p1", &["i1"], "2026-05-09T10:00:00+00:00").await;
        seed(&f, "p2", &["i2"], "2026-05-09T10:01:00+00:00").await;
        f.backend.push(NetworkOutcome::Http { status: 503, body: "unavailable".to_string() });
        f.backend.push(accept_all(&["i2"]));

        let summary = f.worker.run_once().await.unwrap();
        assert_eq!(summary.outcome, WorkerOutcome::Completed);
        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.rejected, 1);

        let stores = f.context.stores();
        let pending = stores.pending_items().get_all_items().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].has_server_error());

        let counts = stores.pending_items().get_error_counts().await.unwrap();
        assert_eq!(counts.critical, 1);
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_rest_of_the_run() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, ScriptedBackend::default());
        seed(&f, "p1", &["i1"], "2026-05-09T10:00:00+00:00").await;
        seed(&f, "p2", &["i2"], "2026-05-09T10:01:00+00:00").await;
        f.backend.push(NetworkOutcome::ConnectionFailed("dns".to_string()));

        let summary = f.worker.run_once().await.unwrap();
        assert_eq!(summary.outcome, WorkerOutcome::Retry);
        assert_eq!(summary.deferred, 2);
        assert!(!summary.offline_alert);
        // Only the first purchase was attempted.
        assert_eq!(f.backend.upload_calls.load(Ordering::SeqCst), 1);

        // Second consecutive miss of the same purchase raises the alert.
        f.backend.push(NetworkOutcome::ConnectionFailed("dns".to_string()));
        let second = f.worker.run_once().await.unwrap();
        assert_eq!(second.outcome, WorkerOutcome::Retry);
        assert!(second.offline_alert);

        let stores = f.context.stores();
        let pending = stores.pending_items().get_all_items().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(PendingItem::is_awaiting_upload));
    }

    #[tokio::test]
    async fn batch_level_400_leaves_rows_clean_for_the_next_run() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, ScriptedBackend::default());
        seed(&f, "p1", &["i1"], "2026-05-09T10:00:00+00:00").await;
        f.backend.push(NetworkOutcome::Http {
            status: 400,
            body: r#"{"message":"ogiltig begäran"}"#.to_string(),
        });

        let summary = f.worker.run_once().await.unwrap();
        assert_eq!(summary.outcome, WorkerOutcome::Completed);
        assert_eq!(summary.rejected, 0);
        assert_eq!(summary.deferred, 1);

        let stores = f.context.stores();
        let pending = stores.pending_items().get_all_items().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_awaiting_upload());

        // Still uploadable: the next run retries the purchase.
        f.backend.push(accept_all(&["i1"]));
        let second = f.worker.run_once().await.unwrap();
        assert_eq!(second.uploaded, 1);
        assert!(stores.pending_items().get_all_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_only_rejection_resolves_silently() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, ScriptedBackend::default());
        seed(&f, "p1", &["i1", "i2"], "2026-05-09T10:00:00+00:00").await;
        f.backend.push(NetworkOutcome::Success(SoldItemBatchResponse {
            accepted_items: Vec::new(),
            rejected_items: vec![
                reject("i1", "DUPLICATE_RECEIPT", "already received"),
                reject("i2", "DUPLICATE_RECEIPT", "already received"),
            ],
        }));

        let summary = f.worker.run_once().await.unwrap();
        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.rejected, 0);

        let stores = f.context.stores();
        assert!(stores.pending_items().get_all_items().await.unwrap().is_empty());
        assert!(stores
            .sold_items()
            .get_all_sold_items()
            .await
            .unwrap()
            .iter()
            .all(|row| row.uploaded));
        assert!(stores.rejected_purchases().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rows_with_user_actionable_errors_are_not_retried() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, ScriptedBackend::default());
        seed(&f, "p1", &["i1"], "2026-05-09T10:00:00+00:00").await;
        f.context
            .stores()
            .pending_items()
            .set_error_text("i1", "priset saknas")
            .await
            .unwrap();

        let summary = f.worker.run_once().await.unwrap();
        assert_eq!(summary.outcome, WorkerOutcome::Completed);
        assert_eq!(summary.deferred, 1);
        assert_eq!(f.backend.upload_calls.load(Ordering::SeqCst), 0);
    }
}
