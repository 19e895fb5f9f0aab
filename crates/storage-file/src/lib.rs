//! Durable file stores for offline sales and ticket scans.
//!
//! Every store is scoped to one event and lives under
//! `<root>/events/<eventId>/`. All writes serialize on a per-store async
//! mutex and land via atomic temp-file replacement, so a crash mid-write
//! leaves the previous file intact. JSONL reads tolerate a torn tail by
//! skipping unparseable lines.

mod array_file;
mod atomic;
pub mod journal;
pub mod paths;
pub mod pending_items;
pub mod registry;
pub mod review;
pub mod scans;
pub mod sold_items;

pub use journal::{Journal, JournalRecord};
pub use pending_items::PendingItemStore;
pub use registry::{EventStores, StoreRegistry};
pub use review::RejectedPurchaseStore;
pub use scans::{CommittedScanStore, PendingScanStore};
pub use sold_items::SoldItemStore;
