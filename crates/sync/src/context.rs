//! Shared wiring for the sync services of one event.

use std::sync::{Arc, Mutex};

use loppiskassa_backend_api::BackendApi;
use loppiskassa_core::alerts::AlertGatekeeper;
use loppiskassa_core::sync::RunSummary;
use loppiskassa_core::StorageError;
use loppiskassa_storage_file::EventStores;

use crate::config::SyncConfig;
use crate::status::{collect_status, SyncStatus};
use crate::tickets::TicketTypeCache;
use crate::vendors::VendorRepository;

/// Everything the checkout flow, workers, and review screens share for one
/// event: its stores, the backend client, the caches, and the offline alert
/// state.
pub struct SyncContext {
    event_id: String,
    stores: Arc<EventStores>,
    api: Arc<dyn BackendApi>,
    vendors: Arc<VendorRepository>,
    ticket_types: Arc<TicketTypeCache>,
    gatekeeper: Arc<AlertGatekeeper>,
    config: SyncConfig,
    last_run: Mutex<Option<RunSummary>>,
}

impl SyncContext {
    pub fn new(stores: Arc<EventStores>, api: Arc<dyn BackendApi>, config: SyncConfig) -> Self {
        let event_id = stores.event_id().to_string();
        let vendors = Arc::new(VendorRepository::new(event_id.clone(), Arc::clone(&api)));
        let ticket_types = Arc::new(TicketTypeCache::new(event_id.clone(), Arc::clone(&api)));
        Self {
            event_id,
            stores,
            api,
            vendors,
            ticket_types,
            gatekeeper: Arc::new(AlertGatekeeper::new()),
            config,
            last_run: Mutex::new(None),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn stores(&self) -> Arc<EventStores> {
        Arc::clone(&self.stores)
    }

    pub fn api(&self) -> Arc<dyn BackendApi> {
        Arc::clone(&self.api)
    }

    pub fn vendors(&self) -> Arc<VendorRepository> {
        Arc::clone(&self.vendors)
    }

    pub fn ticket_types(&self) -> Arc<TicketTypeCache> {
        Arc::clone(&self.ticket_types)
    }

    pub fn gatekeeper(&self) -> Arc<AlertGatekeeper> {
        Arc::clone(&self.gatekeeper)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub(crate) fn record_run(&self, summary: &RunSummary) {
        *self.last_run.lock().unwrap() = Some(summary.clone());
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        self.last_run.lock().unwrap().clone()
    }

    /// Store snapshot plus the most recent worker run, for the status screen.
    pub async fn status(&self) -> Result<SyncStatus, StorageError> {
        let mut status = collect_status(&self.stores).await?;
        status.last_run = self.last_run();
        Ok(status)
    }
}
