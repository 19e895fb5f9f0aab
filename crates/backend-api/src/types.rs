//! Wire types for the Loppiskassa event backend.

use serde::{Deserialize, Serialize};

use loppiskassa_core::sales::PaymentMethod;

/// One item in an upload batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldItemUpload {
    pub item_id: String,
    pub purchase_id: String,
    pub seller: i32,
    pub price: i64,
    pub payment_method: PaymentMethod,
    /// Epoch milliseconds.
    pub sold_time: i64,
}

/// POST body for the batch upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldItemBatchRequest {
    pub items: Vec<SoldItemUpload>,
}

/// Per-item acceptance report for one uploaded batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldItemBatchResponse {
    /// Item ids the backend accepted and persisted.
    pub accepted_items: Vec<String>,
    #[serde(default)]
    pub rejected_items: Vec<RejectedItemReport>,
}

/// One refused item with the backend's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedItemReport {
    pub item: SoldItemUpload,
    pub reason: String,
    /// Raw wire code; parse with `RejectionCode::parse` so unknown values
    /// degrade to `UNSPECIFIED` instead of failing the whole response.
    #[serde(default)]
    pub error_code: Option<String>,
}

/// One page of the approved-seller filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorFilterPage {
    pub sellers: Vec<i32>,
    /// Opaque cursor; absent on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// POST body for committing one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub scan_id: String,
    pub ticket_id: String,
    pub scanned_at: String,
    pub was_offline: bool,
}

/// Updated ticket returned by a successful scan commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub ticket_id: String,
    #[serde(default)]
    pub ticket_type: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub scanned_at: Option<String>,
}

/// One entry in the event's ticket-type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTypeInfo {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_response_tolerates_missing_rejections() {
        let response: SoldItemBatchResponse =
            serde_json::from_str(r#"{"acceptedItems":["i1","i2"]}"#).expect("deserialize");
        assert_eq!(response.accepted_items, vec!["i1", "i2"]);
        assert!(response.rejected_items.is_empty());
    }

    #[test]
    fn rejected_item_report_keeps_unknown_codes_raw() {
        let json = r#"{
            "item": {
                "itemId": "i1",
                "purchaseId": "p1",
                "seller": 31,
                "price": 900,
                "paymentMethod": "SWISH",
                "soldTime": 1762700000000
            },
            "reason": "event closed",
            "errorCode": "EVENT_CLOSED"
        }"#;

        let report: RejectedItemReport = serde_json::from_str(json).expect("deserialize");
        assert_eq!(report.error_code.as_deref(), Some("EVENT_CLOSED"));
        assert_eq!(report.item.payment_method, PaymentMethod::Swish);
    }

    #[test]
    fn vendor_page_without_token_is_the_last_page() {
        let page: VendorFilterPage =
            serde_json::from_str(r#"{"sellers":[1,2,3]}"#).expect("deserialize");
        assert_eq!(page.sellers, vec![1, 2, 3]);
        assert!(page.next_page_token.is_none());
    }
}
