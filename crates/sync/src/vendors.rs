//! Approved-seller cache with single-flight refresh.
//!
//! The checkout keypad checks seller numbers against this cache on every
//! keystroke, so lookups are synchronous and never touch the network. The
//! cache is filled by [`VendorRepository::refresh`], which pages through the
//! backend's seller filter and swaps the whole set in at once.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, info};
use tokio::sync::Mutex;

use loppiskassa_backend_api::{BackendApi, NetworkOutcome};
use loppiskassa_core::Error;

/// Page size used when fetching the seller filter.
pub const VENDOR_PAGE_SIZE: usize = 100;

/// Hard cap on pages per refresh, against a backend that loops its cursor.
const MAX_VENDOR_PAGES: usize = 1_000;

pub struct VendorRepository {
    event_id: String,
    api: Arc<dyn BackendApi>,
    cache: RwLock<Option<HashSet<i32>>>,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
}

impl VendorRepository {
    pub fn new(event_id: String, api: Arc<dyn BackendApi>) -> Self {
        Self {
            event_id,
            api,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// True once a refresh has completed at least once.
    pub fn is_populated(&self) -> bool {
        self.cache.read().unwrap().is_some()
    }

    /// Cache-only membership check.
    ///
    /// Returns `false` when the cache has never been populated. Fail-closed
    /// on purpose: an unknown seller number at the keypad is worth a warning
    /// the cashier can override, while silently admitting any number is not.
    pub fn is_approved(&self, seller: i32) -> bool {
        self.cache
            .read()
            .unwrap()
            .as_ref()
            .map_or(false, |sellers| sellers.contains(&seller))
    }

    /// Clone of the cached seller set, if populated.
    pub fn approved_sellers(&self) -> Option<HashSet<i32>> {
        self.cache.read().unwrap().clone()
    }

    /// Fetches the full seller filter and swaps the cache in one step.
    ///
    /// Single-flight: a caller that arrives while another refresh is already
    /// running waits for that refresh and shares its result instead of
    /// fetching again. Returns the number of approved sellers.
    pub async fn refresh(&self) -> Result<usize, Error> {
        let generation_before = self.generation.load(Ordering::Acquire);
        let _flight = self.refresh_lock.lock().await;
        if self.generation.load(Ordering::Acquire) != generation_before {
            // Somebody completed a refresh while we waited for the lock.
            let count = self.cache.read().unwrap().as_ref().map_or(0, HashSet::len);
            debug!("[Vendors] Sharing refresh completed by another caller ({count} sellers)");
            return Ok(count);
        }

        let mut sellers = HashSet::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_VENDOR_PAGES {
            let outcome = self
                .api
                .fetch_vendor_page(&self.event_id, VENDOR_PAGE_SIZE, page_token.as_deref())
                .await;
            let page = match outcome {
                NetworkOutcome::Success(page) => page,
                NetworkOutcome::Http { status, body } => {
                    return Err(Error::api(format!("vendor fetch failed: HTTP {status}: {body}")));
                }
                NetworkOutcome::Timeout => {
                    return Err(Error::api("vendor fetch timed out"));
                }
                NetworkOutcome::ConnectionFailed(reason) => {
                    return Err(Error::api(format!("vendor fetch failed: {reason}")));
                }
            };
            sellers.extend(page.sellers);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        if page_token.is_some() {
            return Err(Error::api("vendor filter paging did not terminate"));
        }

        let count = sellers.len();
        *self.cache.write().unwrap() = Some(sellers);
        self.generation.fetch_add(1, Ordering::Release);
        info!("[Vendors] Refreshed seller filter for event {}: {count} sellers", self.event_id);
        Ok(count)
    }

    /// Cached seller set, refreshing first if never populated.
    pub async fn get_or_fetch(&self) -> Result<HashSet<i32>, Error> {
        if let Some(sellers) = self.approved_sellers() {
            return Ok(sellers);
        }
        self.refresh().await?;
        Ok(self.approved_sellers().unwrap_or_default())
    }
}
