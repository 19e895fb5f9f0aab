//! End-to-end flows: checkout through workers through recovery and review,
//! against a scripted in-memory backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use loppiskassa_backend_api::{
    BackendApi, NetworkOutcome, RejectedItemReport, ScanRequest, SoldItemBatchRequest,
    SoldItemBatchResponse, TicketResponse, TicketTypeInfo, VendorFilterPage,
};
use loppiskassa_core::sales::PaymentMethod;
use loppiskassa_core::scanning::ScanStatus;
use loppiskassa_core::sync::{RejectionCode, WorkerOutcome};
use loppiskassa_storage_file::StoreRegistry;
use loppiskassa_sync::{
    collect_status, CheckoutService, PurchaseRecoveryManager, ReviewService, SaleLine,
    ScanSyncWorker, SoldItemsSyncWorker, SyncConfig, SyncContext,
};

/// Scripted behavior for one batch upload call. When the script runs dry the
/// backend validates sellers against its current registry.
enum UploadBehavior {
    Validate,
    RejectAllInvalidSeller,
    Offline,
    Http(u16, String),
}

struct FakeBackend {
    sellers: Mutex<Vec<i32>>,
    vendor_fetches: AtomicUsize,
    upload_calls: AtomicUsize,
    upload_script: Mutex<VecDeque<UploadBehavior>>,
    commit_script: Mutex<VecDeque<NetworkOutcome<TicketResponse>>>,
}

impl FakeBackend {
    fn new(sellers: &[i32]) -> Arc<Self> {
        Arc::new(Self {
            sellers: Mutex::new(sellers.to_vec()),
            vendor_fetches: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            upload_script: Mutex::new(VecDeque::new()),
            commit_script: Mutex::new(VecDeque::new()),
        })
    }

    fn set_sellers(&self, sellers: &[i32]) {
        *self.sellers.lock().unwrap() = sellers.to_vec();
    }

    fn script_upload(&self, behavior: UploadBehavior) {
        self.upload_script.lock().unwrap().push_back(behavior);
    }

    fn script_commit(&self, outcome: NetworkOutcome<TicketResponse>) {
        self.commit_script.lock().unwrap().push_back(outcome);
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn upload_sold_items(
        &self,
        _event_id: &str,
        request: SoldItemBatchRequest,
    ) -> NetworkOutcome<SoldItemBatchResponse> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .upload_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(UploadBehavior::Validate);

        match behavior {
            UploadBehavior::Offline => NetworkOutcome::ConnectionFailed("no route to host".to_string()),
            UploadBehavior::Http(status, body) => NetworkOutcome::Http { status, body },
            UploadBehavior::RejectAllInvalidSeller => {
                let rejected = request
                    .items
                    .into_iter()
                    .map(|item| RejectedItemReport {
                        reason: format!("säljare {} är inte registrerad", item.seller),
                        error_code: Some("INVALID_SELLER".to_string()),
                        item,
                    })
                    .collect();
                NetworkOutcome::Success(SoldItemBatchResponse {
                    accepted_items: Vec::new(),
                    rejected_items: rejected,
                })
            }
            UploadBehavior::Validate => {
                let sellers = self.sellers.lock().unwrap().clone();
                let mut accepted = Vec::new();
                let mut rejected = Vec::new();
                for item in request.items {
                    if sellers.contains(&item.seller) {
                        accepted.push(item.item_id.clone());
                    } else {
                        rejected.push(RejectedItemReport {
                            reason: format!("säljare {} är inte registrerad", item.seller),
                            error_code: Some("INVALID_SELLER".to_string()),
                            item,
                        });
                    }
                }
                NetworkOutcome::Success(SoldItemBatchResponse {
                    accepted_items: accepted,
                    rejected_items: rejected,
                })
            }
        }
    }

    async fn fetch_vendor_page(
        &self,
        _event_id: &str,
        _page_size: usize,
        _page_token: Option<&str>,
    ) -> NetworkOutcome<VendorFilterPage> {
        self.vendor_fetches.fetch_add(1, Ordering::SeqCst);
        NetworkOutcome::Success(VendorFilterPage {
            sellers: self.sellers.lock().unwrap().clone(),
            next_page_token: None,
        })
    }

    async fn fetch_ticket_types(&self, _event_id: &str) -> NetworkOutcome<Vec<TicketTypeInfo>> {
        NetworkOutcome::Success(Vec::new())
    }

    async fn commit_scan(
        &self,
        _event_id: &str,
        request: ScanRequest,
    ) -> NetworkOutcome<TicketResponse> {
        self.commit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                NetworkOutcome::Success(TicketResponse {
                    ticket_id: request.ticket_id.clone(),
                    ticket_type: Some("Vuxen".to_string()),
                    email: None,
                    scanned_at: Some(request.scanned_at.clone()),
                })
            })
    }
}

struct Harness {
    _dir: TempDir,
    context: Arc<SyncContext>,
    checkout: CheckoutService,
    sold_worker: SoldItemsSyncWorker,
    scan_worker: ScanSyncWorker,
    review: ReviewService,
    backend: Arc<FakeBackend>,
}

fn harness(sellers: &[i32]) -> Harness {
    let dir = TempDir::new().unwrap();
    let registry = StoreRegistry::new(dir.path());
    let stores = registry.event("varmarknad-2026").unwrap();
    let backend = FakeBackend::new(sellers);
    let context = Arc::new(SyncContext::new(
        stores,
        Arc::clone(&backend) as Arc<dyn BackendApi>,
        SyncConfig::new("https://api.example.com", "test-token"),
    ));
    let recovery = Arc::new(PurchaseRecoveryManager::new(Arc::clone(&context)));

    Harness {
        _dir: dir,
        checkout: CheckoutService::new(Arc::clone(&context)),
        sold_worker: SoldItemsSyncWorker::new(Arc::clone(&context), Arc::clone(&recovery)),
        scan_worker: ScanSyncWorker::new(Arc::clone(&context)),
        review: ReviewService::new(Arc::clone(&context), recovery),
        context,
        backend,
    }
}

fn line(seller: i32, price: i64) -> SaleLine {
    SaleLine { seller, price }
}

#[tokio::test]
async fn recorded_purchase_uploads_and_clears_the_queue() {
    let h = harness(&[12, 30]);
    let recorded = h
        .checkout
        .record_purchase(&[line(12, 2500), line(30, 1500)], PaymentMethod::Cash)
        .await
        .unwrap();

    // The queue file is plain JSONL in the backend's field naming.
    let stores = h.context.stores();
    let raw = std::fs::read_to_string(stores.pending_items().path()).unwrap();
    assert_eq!(raw.lines().count(), 2);
    let first: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(first["purchaseId"], recorded.purchase_id.as_str());
    assert_eq!(first["sellerId"], 12);

    let summary = h.sold_worker.run_once().await.unwrap();
    assert_eq!(summary.outcome, WorkerOutcome::Completed);
    assert_eq!(summary.uploaded, 2);
    assert_eq!(h.backend.upload_calls.load(Ordering::SeqCst), 1);

    assert!(stores.pending_items().get_all_items().await.unwrap().is_empty());
    assert!(stores
        .sold_items()
        .get_all_sold_items()
        .await
        .unwrap()
        .iter()
        .all(|row| row.uploaded));

    let status = h.context.status().await.unwrap();
    assert_eq!(status.pending_sale_items, 0);
    assert_eq!(status.error_counts.total(), 0);
    let last_run = status.last_run.expect("run was recorded");
    assert_eq!(last_run.uploaded, 2);
}

#[tokio::test]
async fn stale_seller_rejection_recovers_within_one_run() {
    let h = harness(&[12, 31]);
    h.checkout
        .record_purchase(&[line(31, 700)], PaymentMethod::Swish)
        .await
        .unwrap();
    // First attempt hits a stale filter on the backend side.
    h.backend.script_upload(UploadBehavior::RejectAllInvalidSeller);

    let summary = h.sold_worker.run_once().await.unwrap();
    assert_eq!(summary.outcome, WorkerOutcome::Completed);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.rejected, 0);

    // Rejected once, filter refreshed once, then retried successfully.
    assert_eq!(h.backend.upload_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.backend.vendor_fetches.load(Ordering::SeqCst), 1);

    let stores = h.context.stores();
    assert!(stores.pending_items().get_all_items().await.unwrap().is_empty());
    assert!(stores.rejected_purchases().get_all().await.unwrap().is_empty());
    assert!(stores
        .sold_items()
        .get_all_sold_items()
        .await
        .unwrap()
        .iter()
        .all(|row| row.uploaded));
}

#[tokio::test]
async fn unknown_seller_parks_for_review_and_edit_resolves_it() {
    let h = harness(&[12]);
    let recorded = h
        .checkout
        .record_purchase(&[line(31, 700)], PaymentMethod::Cash)
        .await
        .unwrap();

    let summary = h.sold_worker.run_once().await.unwrap();
    assert_eq!(summary.rejected, 1);

    let parked = h.review.pending_review().await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].purchase_id, recorded.purchase_id);
    assert_eq!(parked[0].error_code, RejectionCode::InvalidSeller);
    assert!(parked[0].auto_recovery_attempted);
    assert_eq!(parked[0].items[0].seller, 31);

    let stores = h.context.stores();
    let pending = stores.pending_items().get_all_items().await.unwrap();
    assert_eq!(pending[0].error_text, "säljare 31 är inte registrerad");

    // Cashier fixes the mistyped seller; next run uploads clean.
    h.review
        .resolve_edit_seller(&recorded.purchase_id, 12)
        .await
        .unwrap();
    let second = h.sold_worker.run_once().await.unwrap();
    assert_eq!(second.uploaded, 1);

    assert!(stores.pending_items().get_all_items().await.unwrap().is_empty());
    assert!(h.review.pending_review().await.unwrap().is_empty());
    let log = stores.sold_items().get_all_sold_items().await.unwrap();
    assert!(log.iter().all(|row| row.uploaded && row.seller == 12));
}

#[tokio::test]
async fn offline_stretch_alerts_once_and_uploads_when_back() {
    let h = harness(&[12]);
    h.checkout
        .record_purchase(&[line(12, 400)], PaymentMethod::Cash)
        .await
        .unwrap();

    h.backend.script_upload(UploadBehavior::Offline);
    h.backend.script_upload(UploadBehavior::Offline);
    h.backend.script_upload(UploadBehavior::Offline);

    let first = h.sold_worker.run_once().await.unwrap();
    assert_eq!(first.outcome, WorkerOutcome::Retry);
    assert!(!first.offline_alert);

    let second = h.sold_worker.run_once().await.unwrap();
    assert!(second.offline_alert);

    // Still offline, but the cashier has been told once already.
    let third = h.sold_worker.run_once().await.unwrap();
    assert!(!third.offline_alert);

    let stores = h.context.stores();
    let status = collect_status(&stores).await.unwrap();
    assert_eq!(status.pending_sale_items, 1);

    // Connectivity returns.
    let fourth = h.sold_worker.run_once().await.unwrap();
    assert_eq!(fourth.outcome, WorkerOutcome::Completed);
    assert_eq!(fourth.uploaded, 1);
    let status = collect_status(&stores).await.unwrap();
    assert_eq!(status.pending_sale_items, 0);
}

#[tokio::test]
async fn backend_5xx_keeps_the_purchase_retryable_as_critical() {
    let h = harness(&[12]);
    h.checkout
        .record_purchase(&[line(12, 400)], PaymentMethod::Swish)
        .await
        .unwrap();
    h.backend
        .script_upload(UploadBehavior::Http(503, "maintenance".to_string()));

    let first = h.sold_worker.run_once().await.unwrap();
    assert_eq!(first.outcome, WorkerOutcome::Completed);
    assert_eq!(first.rejected, 1);

    let stores = h.context.stores();
    let status = collect_status(&stores).await.unwrap();
    assert_eq!(status.error_counts.critical, 1);

    // Sentinel rows retry automatically once the backend recovers.
    let second = h.sold_worker.run_once().await.unwrap();
    assert_eq!(second.uploaded, 1);
    assert!(stores.pending_items().get_all_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn scans_confirm_and_block_reuse_of_the_ticket() {
    let h = harness(&[]);
    let first = h.checkout.record_scan("AA-11", true).await.unwrap();
    assert!(!first.duplicate);

    // Same ticket again while still offline: refused from local history.
    let offline_dup = h.checkout.record_scan("AA-11", true).await.unwrap();
    assert!(offline_dup.duplicate);

    let summary = h.scan_worker.run_once().await.unwrap();
    assert_eq!(summary.uploaded, 1);

    let stores = h.context.stores();
    assert!(stores.pending_scans().get_all_scans().await.unwrap().is_empty());
    let history = stores.committed_scans().get_all_scans().await.unwrap();
    assert_eq!(history.len(), 2);
    let confirmed = history.iter().find(|row| row.scan_id == first.scan_id).unwrap();
    assert_eq!(confirmed.status, ScanStatus::Confirmed);
    assert_eq!(confirmed.ticket_type.as_deref(), Some("Vuxen"));

    // Confirmed history still blocks the ticket at the door.
    let online_dup = h.checkout.record_scan("AA-11", false).await.unwrap();
    assert!(online_dup.duplicate);
}

#[tokio::test]
async fn competing_device_scan_resolves_as_duplicate() {
    let h = harness(&[]);
    let recorded = h.checkout.record_scan("BB-22", true).await.unwrap();
    h.backend.script_commit(NetworkOutcome::Http {
        status: 412,
        body: r#"{"message":"redan skannad"}"#.to_string(),
    });

    let summary = h.scan_worker.run_once().await.unwrap();
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.rejected, 0);

    let stores = h.context.stores();
    let history = stores.committed_scans().get_all_scans().await.unwrap();
    let row = history.iter().find(|row| row.scan_id == recorded.scan_id).unwrap();
    assert_eq!(row.status, ScanStatus::Duplicate);
    assert!(row.error_message.is_none());
}
