//! Advisory change notifications for store observers.

use tokio::sync::watch;

/// Fan-out "something changed" signal with a replay depth of one.
///
/// Observers re-read authoritative store state whenever ticked; correctness
/// never depends on observing every individual tick. A listener that lags
/// simply sees the latest generation and catches up with one re-read.
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: watch::Sender<u64>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Signals one committed change. Never blocks and never fails, even with
    /// zero live listeners.
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn subscribe(&self) -> ChangeListener {
        ChangeListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`ChangeNotifier`].
#[derive(Debug, Clone)]
pub struct ChangeListener {
    rx: watch::Receiver<u64>,
}

impl ChangeListener {
    /// Waits until at least one change happened after the last call.
    ///
    /// Returns `false` once the notifier has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// True when a change is already waiting, without consuming it.
    pub fn has_pending_change(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
