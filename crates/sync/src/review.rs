//! Manual review of purchases the backend refused and recovery gave up on.
//!
//! The pending queue and transaction log stay authoritative; review entries
//! are bookkeeping on top. Listing reconciles against the log first so a
//! purchase that slipped through after all never shows up as a problem.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;

use loppiskassa_core::review::RejectedPurchase;
use loppiskassa_core::{Error, Result};

use crate::context::SyncContext;
use crate::recovery::PurchaseRecoveryManager;

pub struct ReviewService {
    context: Arc<SyncContext>,
    recovery: Arc<PurchaseRecoveryManager>,
}

impl ReviewService {
    pub fn new(context: Arc<SyncContext>, recovery: Arc<PurchaseRecoveryManager>) -> Self {
        Self { context, recovery }
    }

    /// Parked purchases that still need a decision, stale entries dropped.
    ///
    /// An entry is stale when every log row of its purchase is uploaded,
    /// meaning some later run or another device resolved it. Stale entries
    /// are removed on sight.
    pub async fn pending_review(&self) -> Result<Vec<RejectedPurchase>> {
        let stores = self.context.stores();
        let entries = stores.rejected_purchases().get_all().await?;
        if entries.is_empty() {
            return Ok(entries);
        }

        let log = stores.sold_items().get_all_sold_items().await?;
        let mut uploaded_by_purchase: HashMap<&str, (usize, usize)> = HashMap::new();
        for row in &log {
            let slot = uploaded_by_purchase.entry(row.purchase_id.as_str()).or_insert((0, 0));
            slot.0 += 1;
            if row.uploaded {
                slot.1 += 1;
            }
        }

        let mut live = Vec::new();
        for entry in entries {
            let fully_uploaded = uploaded_by_purchase
                .get(entry.purchase_id.as_str())
                .map_or(false, |(total, uploaded)| total == uploaded && *total > 0);
            if fully_uploaded {
                info!(
                    "[Review] Purchase {} resolved since parking; dropping its review entry",
                    entry.purchase_id
                );
                stores.rejected_purchases().remove(&entry.purchase_id).await?;
                self.recovery.on_purchase_resolved(&entry.purchase_id);
                continue;
            }
            live.push(entry);
        }
        Ok(live)
    }

    /// Corrects the seller on every row of the purchase and requeues it
    /// clean for the next worker run.
    pub async fn resolve_edit_seller(&self, purchase_id: &str, new_seller: i32) -> Result<()> {
        if new_seller <= 0 {
            return Err(Error::validation(format!(
                "seller number must be positive, got {new_seller}"
            )));
        }

        let stores = self.context.stores();
        stores
            .pending_items()
            .update_purchase(purchase_id, move |mut row| {
                row.seller_id = new_seller;
                row.error_text.clear();
                Some(row)
            })
            .await?;
        stores.sold_items().set_purchase_seller(purchase_id, new_seller).await?;
        stores.rejected_purchases().remove(purchase_id).await?;
        self.recovery.on_purchase_resolved(purchase_id);
        info!("[Review] Purchase {purchase_id} reassigned to seller {new_seller} and requeued");
        Ok(())
    }

    /// Requeues the purchase unchanged for another upload attempt.
    pub async fn resolve_retry(&self, purchase_id: &str) -> Result<()> {
        let stores = self.context.stores();
        stores.pending_items().set_purchase_error(purchase_id, "").await?;
        stores.rejected_purchases().remove(purchase_id).await?;
        self.recovery.on_purchase_resolved(purchase_id);
        info!("[Review] Purchase {purchase_id} requeued for retry");
        Ok(())
    }

    /// Abandons the purchase entirely: queue rows, log rows, review entry.
    ///
    /// The review entry goes last, so a crash mid-way leaves the purchase
    /// visible in review rather than half-deleted and invisible.
    pub async fn resolve_delete(&self, purchase_id: &str) -> Result<()> {
        let stores = self.context.stores();
        stores.pending_items().delete_purchase(purchase_id).await?;
        stores.sold_items().delete_purchase(purchase_id).await?;
        stores.rejected_purchases().remove(purchase_id).await?;
        self.recovery.on_purchase_resolved(purchase_id);
        info!("[Review] Purchase {purchase_id} deleted after review");
        Ok(())
    }
}
