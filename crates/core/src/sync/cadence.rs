//! Scheduling cadence constants for background sync.

/// Periodic fallback cadence for the sold-items worker.
pub const SOLD_ITEMS_SYNC_INTERVAL_SECS: u64 = 15 * 60;

/// Periodic fallback cadence for the scan worker.
pub const SCAN_SYNC_INTERVAL_SECS: u64 = 15 * 60;

/// Maximum jitter (seconds) added to periodic run intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 30;
