//! Offline-first sync services for the Loppiskassa client.
//!
//! The checkout flow records every sale and scan durably before any network
//! traffic; the workers here drain those queues in the background, reconcile
//! per-item acceptance, and recover or park whatever the backend refuses.
//! Nothing in this crate blocks the register: a dead network degrades sync,
//! never checkout.

pub mod checkout;
pub mod config;
pub mod context;
pub mod recovery;
pub mod review;
pub mod scan_worker;
pub mod scheduler;
pub mod sold_items_worker;
pub mod status;
pub mod tickets;
pub mod vendors;

pub use checkout::{CheckoutService, RecordedPurchase, RecordedScan, SaleLine};
pub use config::SyncConfig;
pub use context::SyncContext;
pub use recovery::{PurchaseRecoveryManager, RecoveryOutcome};
pub use review::ReviewService;
pub use scan_worker::{ScanSyncWorker, SCAN_SYNC_TASK};
pub use scheduler::{
    AlwaysOnline, BackoffPolicy, ConnectivityProbe, SyncScheduler, SyncTask, TaskConstraints,
};
pub use sold_items_worker::{SoldItemsSyncWorker, SOLD_ITEMS_TASK};
pub use status::{collect_status, spawn_badge_watcher, SyncStatus};
pub use tickets::TicketTypeCache;
pub use vendors::{VendorRepository, VENDOR_PAGE_SIZE};
