//! Ticket-type name cache for the scanning screen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::info;
use tokio::sync::Mutex;

use loppiskassa_backend_api::{BackendApi, NetworkOutcome};
use loppiskassa_core::Error;

/// Maps ticket-type ids to display names so scan history stays readable
/// offline. Same single-flight discipline as the seller cache.
pub struct TicketTypeCache {
    event_id: String,
    api: Arc<dyn BackendApi>,
    cache: RwLock<Option<HashMap<String, String>>>,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
}

impl TicketTypeCache {
    pub fn new(event_id: String, api: Arc<dyn BackendApi>) -> Self {
        Self {
            event_id,
            api,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_populated(&self) -> bool {
        self.cache.read().unwrap().is_some()
    }

    /// Display name for a ticket-type id, if cached.
    pub fn name_for(&self, type_id: &str) -> Option<String> {
        self.cache
            .read()
            .unwrap()
            .as_ref()
            .and_then(|types| types.get(type_id).cloned())
    }

    /// Fetches the ticket-type list and swaps the cache in one step.
    ///
    /// Concurrent callers collapse into one fetch. Returns the number of
    /// ticket types.
    pub async fn refresh(&self) -> Result<usize, Error> {
        let generation_before = self.generation.load(Ordering::Acquire);
        let _flight = self.refresh_lock.lock().await;
        if self.generation.load(Ordering::Acquire) != generation_before {
            return Ok(self.cache.read().unwrap().as_ref().map_or(0, HashMap::len));
        }

        let types = match self.api.fetch_ticket_types(&self.event_id).await {
            NetworkOutcome::Success(types) => types,
            NetworkOutcome::Http { status, body } => {
                return Err(Error::api(format!("ticket type fetch failed: HTTP {status}: {body}")));
            }
            NetworkOutcome::Timeout => {
                return Err(Error::api("ticket type fetch timed out"));
            }
            NetworkOutcome::ConnectionFailed(reason) => {
                return Err(Error::api(format!("ticket type fetch failed: {reason}")));
            }
        };

        let mapped: HashMap<String, String> =
            types.into_iter().map(|t| (t.id, t.name)).collect();
        let count = mapped.len();
        *self.cache.write().unwrap() = Some(mapped);
        self.generation.fetch_add(1, Ordering::Release);
        info!("[TicketTypes] Cached {count} ticket types for event {}", self.event_id);
        Ok(count)
    }

    /// Refreshes only when the cache has never been populated.
    pub async fn ensure_populated(&self) -> Result<(), Error> {
        if self.is_populated() {
            return Ok(());
        }
        self.refresh().await?;
        Ok(())
    }
}
