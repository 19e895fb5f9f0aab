//! Checkout-side recording: sales and scans hit disk before any network I/O.

use std::sync::Arc;

use log::debug;
use uuid::Uuid;

use loppiskassa_core::sales::{PaymentMethod, PendingItem, StoredSoldItem};
use loppiskassa_core::scanning::{CommittedScan, PendingScan, ScanStatus};
use loppiskassa_core::time::{now_epoch_millis, now_rfc3339};
use loppiskassa_core::{Error, Result};

use crate::context::SyncContext;

/// One line of a purchase as entered at the keypad.
#[derive(Debug, Clone, Copy)]
pub struct SaleLine {
    pub seller: i32,
    /// Price in minor currency units.
    pub price: i64,
}

/// Receipt of a durably recorded purchase.
#[derive(Debug, Clone)]
pub struct RecordedPurchase {
    pub purchase_id: String,
    pub item_ids: Vec<String>,
}

/// Receipt of a durably recorded scan attempt.
#[derive(Debug, Clone)]
pub struct RecordedScan {
    pub scan_id: String,
    /// True when local history already held this ticket, so nothing was
    /// queued and the cashier should see the duplicate screen.
    pub duplicate: bool,
}

pub struct CheckoutService {
    context: Arc<SyncContext>,
}

impl CheckoutService {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self { context }
    }

    /// Records one completed purchase.
    ///
    /// Returns only after both the upload queue and the transaction log have
    /// hit disk. The queue is written first: a crash between the two writes
    /// leaves a sale that will still upload, while the opposite order could
    /// leave a sale recorded locally that the backend never hears about.
    pub async fn record_purchase(
        &self,
        lines: &[SaleLine],
        payment_method: PaymentMethod,
    ) -> Result<RecordedPurchase> {
        if lines.is_empty() {
            return Err(Error::validation("a purchase needs at least one item"));
        }
        for line in lines {
            if line.seller <= 0 {
                return Err(Error::validation(format!(
                    "seller number must be positive, got {}",
                    line.seller
                )));
            }
            if line.price < 0 {
                return Err(Error::validation(format!(
                    "price must not be negative, got {}",
                    line.price
                )));
            }
        }

        let purchase_id = Uuid::new_v4().to_string();
        let timestamp = now_rfc3339();
        let sold_time = now_epoch_millis();

        let mut pending_rows = Vec::with_capacity(lines.len());
        let mut sold_rows = Vec::with_capacity(lines.len());
        let mut item_ids = Vec::with_capacity(lines.len());
        for line in lines {
            let item_id = Uuid::new_v4().to_string();
            pending_rows.push(PendingItem {
                item_id: item_id.clone(),
                purchase_id: purchase_id.clone(),
                seller_id: line.seller,
                price: line.price,
                error_text: String::new(),
                timestamp: timestamp.clone(),
            });
            sold_rows.push(StoredSoldItem {
                item_id: item_id.clone(),
                event_id: self.context.event_id().to_string(),
                purchase_id: purchase_id.clone(),
                seller: line.seller,
                price: line.price,
                payment_method,
                sold_time,
                uploaded: false,
            });
            item_ids.push(item_id);
        }

        let stores = self.context.stores();
        stores.pending_items().append_items(pending_rows).await?;
        stores.sold_items().append_sold_items(sold_rows).await?;

        debug!(
            "[Checkout] Recorded purchase {purchase_id} with {} item(s)",
            item_ids.len()
        );
        Ok(RecordedPurchase { purchase_id, item_ids })
    }

    /// Records one ticket scan.
    ///
    /// Local history is consulted first so a ticket scanned twice at the
    /// door turns the screen red even with no connectivity. Rejected rows in
    /// history do not count: a refused scan never admitted anyone.
    pub async fn record_scan(&self, ticket_id: &str, was_offline: bool) -> Result<RecordedScan> {
        let ticket_id = ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(Error::validation("ticket id must not be empty"));
        }

        let stores = self.context.stores();
        let scan_id = Uuid::new_v4().to_string();
        let scanned_at = now_rfc3339();

        if stores.committed_scans().has_ticket(ticket_id).await? {
            // Record the attempt for the audit trail, but never queue it.
            let duplicate_row = CommittedScan {
                scan_id: scan_id.clone(),
                ticket_id: ticket_id.to_string(),
                event_id: self.context.event_id().to_string(),
                scanned_at,
                committed_at: None,
                was_offline,
                status: ScanStatus::Duplicate,
                ticket_type: None,
                email: None,
                error_message: None,
            };
            stores.committed_scans().append_scan(duplicate_row).await?;
            debug!("[Checkout] Ticket {ticket_id} already in local history; scan refused");
            return Ok(RecordedScan { scan_id, duplicate: true });
        }

        let scan = PendingScan {
            scan_id: scan_id.clone(),
            ticket_id: ticket_id.to_string(),
            event_id: self.context.event_id().to_string(),
            scanned_at,
            was_offline,
        };
        stores.pending_scans().append_scan(scan.clone()).await?;
        stores
            .committed_scans()
            .append_scan(CommittedScan::from_pending(&scan))
            .await?;

        Ok(RecordedScan { scan_id, duplicate: false })
    }
}
