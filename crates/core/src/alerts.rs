//! Rate limiting for the "sale could not be uploaded" alert.

use std::collections::HashMap;
use std::sync::Mutex;

/// Decides when a missed-upload alert may be surfaced to the cashier.
///
/// A purchase earns an alert on its second consecutive missed upload, not the
/// first; a single miss is normal at a market with flaky connectivity. Once
/// one alert fires, everything is suppressed until an upload succeeds again,
/// so a long offline stretch produces one alert rather than one per purchase.
#[derive(Debug, Default)]
pub struct AlertGatekeeper {
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    suppressed: bool,
    missed_by_purchase: HashMap<String, u32>,
}

impl AlertGatekeeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a missed upload for `purchase_id`.
    ///
    /// Returns `true` exactly on that purchase's count crossing from one to
    /// two while alerts are not suppressed. A `true` return also flips the
    /// gate to suppressed. Counts keep accumulating while suppressed, but
    /// every call returns `false` until [`Self::record_successful_upload`].
    pub fn record_missed_upload(&self, purchase_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let count = state
            .missed_by_purchase
            .entry(purchase_id.to_string())
            .or_insert(0);
        *count += 1;
        let crossed_threshold = *count == 2;

        if state.suppressed {
            return false;
        }
        if crossed_threshold {
            state.suppressed = true;
            return true;
        }
        false
    }

    /// Clears every per-purchase counter and re-arms alerts.
    pub fn record_successful_upload(&self) {
        let mut state = self.state.lock().unwrap();
        state.missed_by_purchase.clear();
        state.suppressed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_fires_on_second_miss_only() {
        let gate = AlertGatekeeper::new();
        assert!(!gate.record_missed_upload("p1"));
        assert!(gate.record_missed_upload("p1"));
    }

    #[test]
    fn alert_suppressed_after_firing_until_success() {
        let gate = AlertGatekeeper::new();
        assert!(!gate.record_missed_upload("p1"));
        assert!(gate.record_missed_upload("p1"));

        // Third miss of the same purchase and a fresh second miss of another
        // purchase both stay quiet while suppressed.
        assert!(!gate.record_missed_upload("p1"));
        assert!(!gate.record_missed_upload("p2"));
        assert!(!gate.record_missed_upload("p2"));

        gate.record_successful_upload();
        assert!(!gate.record_missed_upload("p1"));
        assert!(gate.record_missed_upload("p1"));
    }

    #[test]
    fn success_resets_counts_to_zero() {
        let gate = AlertGatekeeper::new();
        assert!(!gate.record_missed_upload("p1"));
        gate.record_successful_upload();

        // Counter restarted, so this is miss number one again.
        assert!(!gate.record_missed_upload("p1"));
        assert!(gate.record_missed_upload("p1"));
    }

    #[test]
    fn independent_purchases_track_separate_counts() {
        let gate = AlertGatekeeper::new();
        assert!(!gate.record_missed_upload("p1"));
        assert!(!gate.record_missed_upload("p2"));
        assert!(gate.record_missed_upload("p2"));
    }
}
