//! Sale domain models: the permanent transaction log row, the pending upload
//! queue row, and per-purchase error severity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reserved error text marking pending rows hit by a backend 5xx.
///
/// Written verbatim and compared exactly (case-sensitive). Ordinary
/// validation messages must never equal this value.
pub const SERVER_ERROR_SENTINEL: &str = "serverfel";

/// Payment method accepted at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Swish,
}

/// One sold item in the permanent local transaction log.
///
/// `price` is in minor currency units. `sold_time` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSoldItem {
    pub item_id: String,
    pub event_id: String,
    pub purchase_id: String,
    pub seller: i32,
    pub price: i64,
    pub payment_method: PaymentMethod,
    pub sold_time: i64,
    pub uploaded: bool,
}

/// One item awaiting upload (or holding its last rejection reason).
///
/// Row presence in the pending store is the sole "not yet confirmed" signal;
/// deletion is the sole success signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItem {
    pub item_id: String,
    pub purchase_id: String,
    pub seller_id: i32,
    pub price: i64,
    /// Empty while awaiting a first attempt or after a transport failure;
    /// otherwise the last rejection reason shown to the cashier.
    pub error_text: String,
    /// RFC 3339 creation time; workers process purchases oldest-first.
    pub timestamp: String,
}

impl PendingItem {
    /// True when the row has no recorded rejection.
    pub fn is_awaiting_upload(&self) -> bool {
        self.error_text.is_empty()
    }

    /// True when the row was last refused by a backend 5xx.
    pub fn has_server_error(&self) -> bool {
        self.error_text == SERVER_ERROR_SENTINEL
    }
}

/// Severity of a purchase's pending rows, for badge rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseSeverity {
    Info,
    Warning,
    Critical,
}

/// Number of pending purchases at each severity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCounts {
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
}

impl ErrorCounts {
    pub fn total(&self) -> usize {
        self.info + self.warning + self.critical
    }

    /// Highest severity present, if any purchase is pending at all.
    pub fn highest(&self) -> Option<PurchaseSeverity> {
        if self.critical > 0 {
            Some(PurchaseSeverity::Critical)
        } else if self.warning > 0 {
            Some(PurchaseSeverity::Warning)
        } else if self.info > 0 {
            Some(PurchaseSeverity::Info)
        } else {
            None
        }
    }
}

/// Classifies one purchase from its pending rows.
///
/// Rule:
/// 1. any row carrying the server-error sentinel is critical
/// 2. otherwise any row with a non-empty error is a warning
/// 3. otherwise the purchase is merely awaiting upload (info)
pub fn purchase_severity<'a>(rows: impl IntoIterator<Item = &'a PendingItem>) -> PurchaseSeverity {
    let mut severity = PurchaseSeverity::Info;
    for row in rows {
        if row.has_server_error() {
            return PurchaseSeverity::Critical;
        }
        if !row.error_text.is_empty() {
            severity = PurchaseSeverity::Warning;
        }
    }
    severity
}

/// Groups pending rows by purchase and counts purchases per severity level.
pub fn count_purchase_errors(rows: &[PendingItem]) -> ErrorCounts {
    let mut by_purchase: HashMap<&str, Vec<&PendingItem>> = HashMap::new();
    for row in rows {
        by_purchase.entry(row.purchase_id.as_str()).or_default().push(row);
    }

    let mut counts = ErrorCounts::default();
    for rows in by_purchase.values() {
        match purchase_severity(rows.iter().copied()) {
            PurchaseSeverity::Info => counts.info += 1,
            PurchaseSeverity::Warning => counts.warning += 1,
            PurchaseSeverity::Critical => counts.critical += 1,
        }
    }
    counts
}
