//! Connectivity-gated background scheduling for sync workers.
//!
//! Platform shells differ in what they can tell us about the network, so the
//! scheduler only depends on the [`ConnectivityProbe`] trait; shells with no
//! signal at all plug in [`AlwaysOnline`] and let the workers discover
//! outages through transport failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use loppiskassa_core::sync::{WorkerOutcome, SYNC_INTERVAL_JITTER_SECS};

/// How often an offline task re-polls the probe.
const OFFLINE_POLL_SECS: u64 = 30;

/// Reports whether the device currently has a usable network path.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probe for platforms with no connectivity signal; always reports online.
pub struct AlwaysOnline;

#[async_trait]
impl ConnectivityProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// A schedulable unit of sync work.
#[async_trait]
pub trait SyncTask: Send + Sync + 'static {
    /// Stable name; scheduling a second task under the same name replaces
    /// the first.
    fn name(&self) -> &'static str;

    async fn run(&self) -> WorkerOutcome;
}

/// Declarative requirements checked before each run.
#[derive(Debug, Clone, Copy)]
pub struct TaskConstraints {
    pub requires_network: bool,
}

impl Default for TaskConstraints {
    fn default() -> Self {
        Self { requires_network: true }
    }
}

/// Exponential backoff with jitter, applied after runs that ask for a retry.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_exponent: u32,
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_exponent: 8,
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.max_exponent);
        let base = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        base + jitter(self.max_jitter)
    }
}

struct ScheduledTask {
    handle: JoinHandle<()>,
    wake: Arc<Notify>,
    stop: Arc<AtomicBool>,
}

impl ScheduledTask {
    /// Asks the loop to exit after its current run; never interrupts a run
    /// that is already inside `task.run()`.
    fn retire(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

/// Runs registered tasks periodically until shutdown.
///
/// Each task loops on its own tokio task: run, then sleep for the jittered
/// interval (or the backoff delay after a retry request), waking early when
/// poked via [`SyncScheduler::run_now`].
pub struct SyncScheduler {
    probe: Arc<dyn ConnectivityProbe>,
    tasks: Mutex<HashMap<&'static str, ScheduledTask>>,
}

impl SyncScheduler {
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            probe,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts the periodic loop for `task`, retiring any loop already
    /// registered under the same name once its current run finishes.
    pub fn schedule_periodic(
        &self,
        task: Arc<dyn SyncTask>,
        interval: Duration,
        constraints: TaskConstraints,
        backoff: BackoffPolicy,
    ) {
        let name = task.name();
        let wake = Arc::new(Notify::new());
        let stop = Arc::new(AtomicBool::new(false));
        let loop_wake = Arc::clone(&wake);
        let loop_stop = Arc::clone(&stop);
        let probe = Arc::clone(&self.probe);

        let handle = tokio::spawn(async move {
            let mut consecutive_retries: u32 = 0;
            loop {
                if loop_stop.load(Ordering::Acquire) {
                    debug!("[Scheduler] {name}: loop retired");
                    break;
                }
                let online = !constraints.requires_network || probe.is_online().await;
                let delay = if !online {
                    debug!("[Scheduler] {name}: offline, deferring run");
                    Duration::from_secs(OFFLINE_POLL_SECS) + jitter(jitter_bound())
                } else {
                    match task.run().await {
                        WorkerOutcome::Completed => {
                            consecutive_retries = 0;
                            interval + jitter(jitter_bound())
                        }
                        WorkerOutcome::Retry => {
                            let attempt = consecutive_retries;
                            consecutive_retries = consecutive_retries.saturating_add(1);
                            let delay = backoff.delay_for_attempt(attempt);
                            debug!(
                                "[Scheduler] {name}: retry {} in {}ms",
                                consecutive_retries,
                                delay.as_millis()
                            );
                            delay
                        }
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = loop_wake.notified() => {
                        debug!("[Scheduler] {name}: woken early");
                    }
                }
            }
        });

        let mut tasks = self.tasks.lock().unwrap();
        if let Some(previous) = tasks.insert(name, ScheduledTask { handle, wake, stop }) {
            // Cooperative: a run the old loop already started finishes
            // normally, its leftovers are picked up by the replacement.
            warn!("[Scheduler] Replacing already-scheduled task {name}");
            previous.retire();
        } else {
            info!("[Scheduler] Scheduled task {name} every {}s", interval.as_secs());
        }
    }

    /// Wakes the named task's loop now. Returns `false` for unknown names.
    pub fn run_now(&self, name: &str) -> bool {
        let tasks = self.tasks.lock().unwrap();
        match tasks.get(name) {
            Some(task) => {
                task.wake.notify_one();
                true
            }
            None => false,
        }
    }

    /// Cancels every task loop.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for (name, task) in tasks.drain() {
            debug!("[Scheduler] Stopping task {name}");
            task.handle.abort();
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn jitter_bound() -> Duration {
    Duration::from_secs(SYNC_INTERVAL_JITTER_SECS)
}

fn jitter(bound: Duration) -> Duration {
    let bound_ms = bound.as_millis() as u64;
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=bound_ms))
}
