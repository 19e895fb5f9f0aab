//! HTTP client for the Loppiskassa event backend.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::outcome::NetworkOutcome;
use crate::types::{
    ScanRequest, SoldItemBatchRequest, SoldItemBatchResponse, TicketResponse, TicketTypeInfo,
    VendorFilterPage,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Backend operations the sync layer depends on.
///
/// The production implementation is [`ApiClient`]; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Uploads a batch of sold items for per-item acceptance.
    async fn upload_sold_items(
        &self,
        event_id: &str,
        request: SoldItemBatchRequest,
    ) -> NetworkOutcome<SoldItemBatchResponse>;

    /// Fetches one page of the approved-seller filter.
    async fn fetch_vendor_page(
        &self,
        event_id: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> NetworkOutcome<VendorFilterPage>;

    /// Fetches the event's ticket-type catalog.
    async fn fetch_ticket_types(&self, event_id: &str) -> NetworkOutcome<Vec<TicketTypeInfo>>;

    /// Commits one scan. HTTP 412 signals the ticket was already scanned
    /// server-side; callers treat that as success for queue purposes.
    async fn commit_scan(
        &self,
        event_id: &str,
        request: ScanRequest,
    ) -> NetworkOutcome<TicketResponse>;
}

/// Client for the Loppiskassa event backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderValue,
}

impl ApiClient {
    /// Builds a client for `base_url`. The access token is validated here so
    /// request paths never fail on header construction.
    pub fn new(base_url: &str, token: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|err| ApiError::Config(format!("failed to build HTTP client: {err}")))?;

        let auth_header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ApiError::Config("invalid access token format".to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, self.auth_header.clone());
        headers
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Resolves a response into an outcome, reading the body exactly once.
    async fn read_outcome<T: DeserializeOwned>(response: reqwest::Response) -> NetworkOutcome<T> {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return NetworkOutcome::from_transport_error(&err),
        };
        Self::log_response(status, &body);

        if !status.is_success() {
            return NetworkOutcome::Http {
                status: status.as_u16(),
                body,
            };
        }

        match serde_json::from_str(&body) {
            Ok(value) => NetworkOutcome::Success(value),
            Err(err) => {
                log::error!(
                    "Failed to deserialize response. Body: {}, Error: {}",
                    body,
                    err
                );
                // A malformed success body gives no proof the write landed;
                // report it as an HTTP-level failure so callers stay careful.
                NetworkOutcome::Http {
                    status: status.as_u16(),
                    body: format!("unparseable response body: {err}"),
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> NetworkOutcome<T> {
        match self.client.get(&url).headers(self.headers()).send().await {
            Ok(response) => Self::read_outcome(response).await,
            Err(err) => NetworkOutcome::from_transport_error(&err),
        }
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> NetworkOutcome<T> {
        match self
            .client
            .post(&url)
            .headers(self.headers())
            .json(body)
            .send()
            .await
        {
            Ok(response) => Self::read_outcome(response).await,
            Err(err) => NetworkOutcome::from_transport_error(&err),
        }
    }
}

#[async_trait]
impl BackendApi for ApiClient {
    /// POST /api/v1/events/{eventId}/sold-items/batch
    async fn upload_sold_items(
        &self,
        event_id: &str,
        request: SoldItemBatchRequest,
    ) -> NetworkOutcome<SoldItemBatchResponse> {
        let url = format!(
            "{}/api/v1/events/{}/sold-items/batch",
            self.base_url, event_id
        );
        debug!(
            "[BackendApi] Uploading {} sold item(s) for event {}",
            request.items.len(),
            event_id
        );
        self.post_json(url, &request).await
    }

    /// GET /api/v1/events/{eventId}/vendors?pageSize=N&pageToken=...
    async fn fetch_vendor_page(
        &self,
        event_id: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> NetworkOutcome<VendorFilterPage> {
        let mut url = format!(
            "{}/api/v1/events/{}/vendors?pageSize={}",
            self.base_url, event_id, page_size
        );
        if let Some(token) = page_token {
            url = format!("{}&pageToken={}", url, urlencoding::encode(token));
        }
        self.get(url).await
    }

    /// GET /api/v1/events/{eventId}/ticket-types
    async fn fetch_ticket_types(&self, event_id: &str) -> NetworkOutcome<Vec<TicketTypeInfo>> {
        let url = format!("{}/api/v1/events/{}/ticket-types", self.base_url, event_id);
        self.get(url).await
    }

    /// POST /api/v1/events/{eventId}/scans
    async fn commit_scan(
        &self,
        event_id: &str,
        request: ScanRequest,
    ) -> NetworkOutcome<TicketResponse> {
        let url = format!("{}/api/v1/events/{}/scans", self.base_url, event_id);
        debug!(
            "[BackendApi] Committing scan {} for event {}",
            request.scan_id, event_id
        );
        self.post_json(url, &request).await
    }
}
