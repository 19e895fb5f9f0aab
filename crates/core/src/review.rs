//! Manual-review domain models for purchases that failed automatic recovery.

use serde::{Deserialize, Serialize};

use crate::sync::RejectionCode;

/// One rejected item, with enough detail for the review screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedItemDetails {
    pub item_id: String,
    pub seller: i32,
    pub price: i64,
    pub reason: String,
}

/// A purchase parked for human review.
///
/// Mirrors state that also exists in the pending store; the pending rows stay
/// authoritative and this entry is advisory until the user resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedPurchase {
    pub purchase_id: String,
    pub items: Vec<RejectedItemDetails>,
    pub error_code: RejectionCode,
    pub error_message: String,
    /// RFC 3339 time the purchase was parked.
    pub timestamp: String,
    pub retry_attempts: i32,
    pub auto_recovery_attempted: bool,
    pub needs_manual_review: bool,
}
