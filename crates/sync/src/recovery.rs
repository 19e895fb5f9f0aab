//! Automatic recovery for rejected purchases.
//!
//! Two structured rejections have a known fix. DUPLICATE_RECEIPT means the
//! backend already holds the purchase, so the device just finishes it locally
//! without bothering anyone. INVALID_SELLER is usually a stale seller filter:
//! refresh the filter, re-validate, and retry the upload, at most once per
//! purchase. Anything still failing after that is parked for manual review.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use loppiskassa_backend_api::{NetworkOutcome, RejectedItemReport};
use loppiskassa_core::review::{RejectedItemDetails, RejectedPurchase};
use loppiskassa_core::sales::{PendingItem, SERVER_ERROR_SENTINEL};
use loppiskassa_core::sync::{
    classify_http_response, classify_rejection, RejectionCode, UploadErrorKind,
};
use loppiskassa_core::time::now_rfc3339;
use loppiskassa_core::Result;

use crate::context::SyncContext;
use crate::sold_items_worker::{build_batch_request, index_log_by_item};

/// End state of one automatic recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Seller filter refreshed, sellers valid again, and the retry accepted.
    Recovered,
    /// Backend already had the purchase; finished locally without noise.
    RecoveredSilently,
    /// Still rejected after recovery; parked with the offending sellers.
    NeedsManualReview(Vec<i32>),
    /// Transient failure mid-recovery; rows stay queued for the next run.
    LeftPending,
    /// The retry was refused for a reason recovery cannot fix.
    Failed(String),
}

pub struct PurchaseRecoveryManager {
    context: Arc<SyncContext>,
    /// Purchases that have spent their one automatic attempt this session.
    attempted: Mutex<HashSet<String>>,
}

impl PurchaseRecoveryManager {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self {
            context,
            attempted: Mutex::new(HashSet::new()),
        }
    }

    /// Finishes a purchase the backend reports as already received: log rows
    /// become uploaded, queue rows disappear, any stale review entry goes.
    pub async fn resolve_duplicate(&self, purchase_id: &str) -> Result<()> {
        let stores = self.context.stores();
        stores.sold_items().mark_purchase_uploaded(purchase_id).await?;
        stores.pending_items().delete_purchase(purchase_id).await?;
        stores.rejected_purchases().remove(purchase_id).await?;
        self.on_purchase_resolved(purchase_id);
        info!("[Recovery] Purchase {purchase_id} was already on the backend; resolved silently");
        Ok(())
    }

    /// One-shot recovery for an INVALID_SELLER rejection.
    ///
    /// Refreshes the seller filter, re-validates the purchase's sellers
    /// against it, and retries the upload once. A purchase that has already
    /// used its attempt goes straight to review.
    pub async fn recover_invalid_seller(
        &self,
        purchase_id: &str,
        rejected: &[RejectedItemReport],
    ) -> Result<RecoveryOutcome> {
        if !self.begin_attempt(purchase_id) {
            self.park(purchase_id, rejected, "").await?;
            warn!(
                "[Recovery] Purchase {purchase_id} already used its automatic attempt; parked for review"
            );
            return Ok(RecoveryOutcome::NeedsManualReview(rejected_sellers(rejected)));
        }

        let stores = self.context.stores();
        let vendors = self.context.vendors();
        if let Err(err) = vendors.refresh().await {
            // Transient. Requeue the rows clean so the next worker run
            // re-uploads them, and hand the attempt back so the rejection
            // that upload earns gets a fresh recovery.
            stores.pending_items().set_purchase_error(purchase_id, "").await?;
            self.retract_attempt(purchase_id);
            warn!("[Recovery] Seller filter refresh failed for purchase {purchase_id}: {err}");
            return Ok(RecoveryOutcome::LeftPending);
        }

        let rows: Vec<PendingItem> = stores
            .pending_items()
            .get_all_items()
            .await?
            .into_iter()
            .filter(|row| row.purchase_id == purchase_id)
            .collect();
        if rows.is_empty() {
            // Resolved by another path while the filter was refreshing.
            self.on_purchase_resolved(purchase_id);
            return Ok(RecoveryOutcome::RecoveredSilently);
        }

        let mut invalid: Vec<i32> = rows
            .iter()
            .map(|row| row.seller_id)
            .filter(|seller| !vendors.is_approved(*seller))
            .collect();
        invalid.sort_unstable();
        invalid.dedup();
        if !invalid.is_empty() {
            self.park(purchase_id, rejected, "").await?;
            info!(
                "[Recovery] Sellers {invalid:?} still unknown after refresh; purchase {purchase_id} parked"
            );
            return Ok(RecoveryOutcome::NeedsManualReview(invalid));
        }

        // Sellers check out against the fresh filter; requeue clean and retry.
        stores.pending_items().set_purchase_error(purchase_id, "").await?;
        self.retry_upload(purchase_id, rows).await
    }

    /// Forgets a purchase so a future rejection gets a fresh attempt.
    pub fn on_purchase_resolved(&self, purchase_id: &str) {
        self.retract_attempt(purchase_id);
    }

    async fn retry_upload(
        &self,
        purchase_id: &str,
        rows: Vec<PendingItem>,
    ) -> Result<RecoveryOutcome> {
        let stores = self.context.stores();
        let log = stores.sold_items().get_all_sold_items().await?;
        let log_index = index_log_by_item(&log);
        let row_refs: Vec<&PendingItem> = rows.iter().collect();
        let request = build_batch_request(&row_refs, &log_index);

        match self
            .context
            .api()
            .upload_sold_items(self.context.event_id(), request)
            .await
        {
            NetworkOutcome::Success(response) => {
                if !response.accepted_items.is_empty() {
                    stores
                        .sold_items()
                        .mark_items_uploaded(response.accepted_items.clone())
                        .await?;
                    stores.pending_items().delete_items(&response.accepted_items).await?;
                    self.context.gatekeeper().record_successful_upload();
                }
                if response.rejected_items.is_empty() {
                    stores.rejected_purchases().remove(purchase_id).await?;
                    self.on_purchase_resolved(purchase_id);
                    info!("[Recovery] Purchase {purchase_id} uploaded after seller filter refresh");
                    return Ok(RecoveryOutcome::Recovered);
                }

                for report in &response.rejected_items {
                    stores
                        .pending_items()
                        .set_error_text(&report.item.item_id, &report.reason)
                        .await?;
                }
                let all_duplicates = response.rejected_items.iter().all(|report| {
                    rejection_kind(report) == UploadErrorKind::Duplicate
                });
                if all_duplicates {
                    self.resolve_duplicate(purchase_id).await?;
                    return Ok(RecoveryOutcome::RecoveredSilently);
                }

                self.park(purchase_id, &response.rejected_items, "").await?;
                warn!("[Recovery] Purchase {purchase_id} still rejected after retry; parked for review");
                Ok(RecoveryOutcome::NeedsManualReview(rejected_sellers(
                    &response.rejected_items,
                )))
            }
            NetworkOutcome::Http { status, body } => match classify_http_response(status, &body) {
                UploadErrorKind::ServerError => {
                    stores
                        .pending_items()
                        .set_purchase_error(purchase_id, SERVER_ERROR_SENTINEL)
                        .await?;
                    warn!("[Recovery] Retry for purchase {purchase_id} hit HTTP {status}; left queued");
                    Ok(RecoveryOutcome::LeftPending)
                }
                UploadErrorKind::ValidationError(message) => {
                    stores.pending_items().set_purchase_error(purchase_id, &message).await?;
                    self.park(purchase_id, &[], &message).await?;
                    Ok(RecoveryOutcome::Failed(message))
                }
                _ => {
                    // Texts were cleared before the retry, so the normal
                    // worker picks the purchase up again next run.
                    warn!("[Recovery] Retry for purchase {purchase_id} got HTTP {status}; left queued");
                    Ok(RecoveryOutcome::LeftPending)
                }
            },
            NetworkOutcome::Timeout | NetworkOutcome::ConnectionFailed(_) => {
                Ok(RecoveryOutcome::LeftPending)
            }
        }
    }

    /// Writes (or refreshes) the review entry for a purchase, bumping its
    /// attempt counter.
    async fn park(
        &self,
        purchase_id: &str,
        rejected: &[RejectedItemReport],
        fallback_message: &str,
    ) -> Result<()> {
        let stores = self.context.stores();
        let code = dominant_code(rejected);
        let message = rejected
            .first()
            .map(|report| report.reason.clone())
            .unwrap_or_else(|| fallback_message.to_string());
        let items: Vec<RejectedItemDetails> = rejected
            .iter()
            .map(|report| RejectedItemDetails {
                item_id: report.item.item_id.clone(),
                seller: report.item.seller,
                price: report.item.price,
                reason: report.reason.clone(),
            })
            .collect();

        let update_items = items.clone();
        let update_message = message.clone();
        let existing = stores
            .rejected_purchases()
            .update(purchase_id, move |entry| {
                entry.retry_attempts += 1;
                entry.auto_recovery_attempted = true;
                entry.needs_manual_review = true;
                entry.timestamp = now_rfc3339();
                if !update_items.is_empty() {
                    entry.items = update_items;
                    entry.error_code = code;
                }
                if !update_message.is_empty() {
                    entry.error_message = update_message;
                }
            })
            .await?;
        if !existing {
            stores
                .rejected_purchases()
                .upsert(RejectedPurchase {
                    purchase_id: purchase_id.to_string(),
                    items,
                    error_code: code,
                    error_message: message,
                    timestamp: now_rfc3339(),
                    retry_attempts: 1,
                    auto_recovery_attempted: true,
                    needs_manual_review: true,
                })
                .await?;
        }
        Ok(())
    }

    fn begin_attempt(&self, purchase_id: &str) -> bool {
        self.attempted.lock().unwrap().insert(purchase_id.to_string())
    }

    fn retract_attempt(&self, purchase_id: &str) {
        self.attempted.lock().unwrap().remove(purchase_id);
    }
}

/// Kind of one structured rejection, code first, reason as fallback context.
pub(crate) fn rejection_kind(report: &RejectedItemReport) -> UploadErrorKind {
    classify_rejection(
        RejectionCode::parse(report.error_code.as_deref().unwrap_or_default()),
        &report.reason,
    )
}

fn rejected_sellers(rejected: &[RejectedItemReport]) -> Vec<i32> {
    let mut sellers: Vec<i32> = rejected.iter().map(|report| report.item.seller).collect();
    sellers.sort_unstable();
    sellers.dedup();
    sellers
}

/// Code to file the review entry under; INVALID_SELLER wins over anything
/// else in a mixed batch.
fn dominant_code(rejected: &[RejectedItemReport]) -> RejectionCode {
    let mut code = RejectionCode::Unspecified;
    for report in rejected {
        match RejectionCode::parse(report.error_code.as_deref().unwrap_or_default()) {
            RejectionCode::InvalidSeller => return RejectionCode::InvalidSeller,
            RejectionCode::DuplicateReceipt => code = RejectionCode::DuplicateReceipt,
            RejectionCode::Unspecified => {}
        }
    }
    code
}
